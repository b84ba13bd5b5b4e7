//! One streaming attempt: invoke the remote client against the partial
//! file, checkpoint durable progress at 1 MiB boundaries, and enforce the
//! per-download wall-clock timeout.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::client::{ProgressFn, RemoteClient, RemoteFileRef};
use crate::control::CancelToken;
use crate::store::{JobId, JobRecord, JobStore};

use super::error::TransferError;
use super::DownloaderCtx;

/// Progress is persisted every time the cumulative count crosses another
/// 1 MiB boundary.
pub(super) const CHECKPOINT_BOUNDARY: u64 = 1024 * 1024;

/// True when `bytes` crossed into a boundary no checkpoint covered yet.
/// `last` holds the highest boundary already persisted.
fn crossed_boundary(last: &AtomicU64, bytes: u64) -> bool {
    let boundary = bytes / CHECKPOINT_BOUNDARY;
    let prev = last.load(Ordering::Relaxed);
    boundary > prev
        && last
            .compare_exchange(prev, boundary, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
}

/// Receives boundary crossings and persists them. Runs until the sender
/// side (the progress callback) is dropped.
async fn checkpoint_loop(store: JobStore, job_id: JobId, mut rx: mpsc::Receiver<u64>) {
    while let Some(bytes) = rx.recv().await {
        if store.checkpoint_bytes(job_id, bytes).await.is_err() {
            tracing::warn!(job_id, "durable progress update failed");
        }
    }
}

/// Run one download attempt. Returns the size of the partial file as
/// reported by the client on success.
pub(super) async fn stream_once(
    ctx: &DownloaderCtx,
    job: &JobRecord,
    partial: &Path,
    start_byte: u64,
    cancel: &CancelToken,
) -> Result<u64, TransferError> {
    let declared = job.declared_size.max(0) as u64;
    let (tx, rx) = mpsc::channel::<u64>(32);
    let worker = tokio::spawn(checkpoint_loop(ctx.store.clone(), job.id, rx));

    let progress: ProgressFn = {
        let events = Arc::clone(&ctx.events);
        let file_id = job.remote_file_id;
        let last = AtomicU64::new(start_byte / CHECKPOINT_BOUNDARY);
        Arc::new(move |bytes: u64| {
            events.publish_progress(file_id, bytes, declared);
            if crossed_boundary(&last, bytes) {
                // Dropping a checkpoint is fine; the next boundary (or the
                // post-stream checkpoint) covers it.
                let _ = tx.try_send(bytes);
            }
        })
    };

    let file = RemoteFileRef {
        file_id: job.remote_file_id,
        reference: job.file_reference.clone(),
    };
    let timeout = ctx.per_download_timeout;
    let result = tokio::time::timeout(
        timeout,
        ctx.client
            .download_file(&file, partial, start_byte, progress, cancel),
    )
    .await;

    let outcome = match result {
        Ok(Ok(total)) => Ok(total),
        Ok(Err(e)) => Err(TransferError::from(e)),
        Err(_) => Err(TransferError::Transport(format!(
            "download exceeded {}s wall clock",
            timeout.as_secs()
        ))),
    };

    // The client call (and with it the progress sender) is gone; let the
    // worker drain its queue before we read the partial size.
    let _ = worker.await;
    outcome
}
