//! Completion: verify the partial against the declared size, atomically
//! publish, digest, and commit. The rename happens before the COMPLETED
//! transition is persisted; recovery re-verifies the digest if we crash in
//! between.

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;

use crate::digest;
use crate::events::DownloadEvent;
use crate::store::JobRecord;

use super::{DownloaderCtx, TransferOutcome};

pub(super) async fn finalize(
    ctx: &DownloaderCtx,
    job: &JobRecord,
    partial: &Path,
    final_path: &Path,
    started: Instant,
    bytes_at_start: u64,
) -> Result<TransferOutcome> {
    let declared = job.declared_size.max(0) as u64;
    let size = match tokio::fs::metadata(partial).await {
        Ok(m) => m.len(),
        Err(e) => {
            let msg = format!("filesystem: partial vanished: {e}");
            ctx.store.mark_failed(job.id, &msg, None).await?;
            publish_failed(ctx, job, &msg).await?;
            return Ok(TransferOutcome::Failed);
        }
    };
    ctx.store.checkpoint_bytes(job.id, size).await?;

    if size < declared {
        // Stream ended early; keep the partial and checkpoint for resume.
        ctx.store.mark_failed(job.id, "incomplete", None).await?;
        publish_failed(ctx, job, "incomplete").await?;
        return Ok(TransferOutcome::Failed);
    }

    if size > declared {
        // More bytes than the server declared: the partial cannot be
        // trusted. Drop it and let the next sweep start clean.
        tokio::fs::remove_file(partial)
            .await
            .with_context(|| format!("remove oversized partial {}", partial.display()))?;
        ctx.store.reset_progress(job.id).await?;
        let msg = format!("integrity: got {size} bytes, declared {declared}");
        ctx.store.mark_failed(job.id, &msg, None).await?;
        publish_failed(ctx, job, &msg).await?;
        return Ok(TransferOutcome::Failed);
    }

    tokio::fs::rename(partial, final_path)
        .await
        .with_context(|| {
            format!(
                "rename {} to {}",
                partial.display(),
                final_path.display()
            )
        })?;

    let digest = {
        let path = final_path.to_path_buf();
        tokio::task::spawn_blocking(move || digest::md5_path(&path))
            .await
            .context("digest task join")??
    };

    ctx.store.mark_completed(job.id, size, &digest).await?;
    ctx.cache.insert(job.remote_file_id);

    let elapsed = started.elapsed();
    let transferred = size.saturating_sub(bytes_at_start);
    let throughput_bps = transferred as f64 / elapsed.as_secs_f64().max(1e-6);
    ctx.events.publish(&DownloadEvent::JobCompleted {
        file_id: job.remote_file_id,
        bytes: size,
        elapsed,
        throughput_bps,
    });
    tracing::info!(
        job = job.id,
        bytes = size,
        "completed: {}",
        final_path.display()
    );
    Ok(TransferOutcome::Completed { bytes: size })
}

/// Zero-byte jobs skip streaming entirely: publish an empty file and commit
/// with the digest of empty content.
pub(super) async fn complete_empty(
    ctx: &DownloaderCtx,
    job: &JobRecord,
    partial: &Path,
    final_path: &Path,
) -> Result<TransferOutcome> {
    if tokio::fs::metadata(partial).await.is_ok() {
        tokio::fs::remove_file(partial).await.ok();
    }
    tokio::fs::File::create(final_path)
        .await
        .with_context(|| format!("create empty {}", final_path.display()))?;

    ctx.store
        .mark_completed(job.id, 0, digest::EMPTY_DIGEST)
        .await?;
    ctx.cache.insert(job.remote_file_id);
    ctx.events.publish(&DownloadEvent::JobCompleted {
        file_id: job.remote_file_id,
        bytes: 0,
        elapsed: std::time::Duration::ZERO,
        throughput_bps: 0.0,
    });
    Ok(TransferOutcome::Completed { bytes: 0 })
}

pub(super) async fn publish_failed(ctx: &DownloaderCtx, job: &JobRecord, error: &str) -> Result<()> {
    let attempts = ctx
        .store
        .get_job(job.id)
        .await?
        .map(|j| j.attempt_count as u32)
        .unwrap_or(0);
    ctx.events.publish(&DownloadEvent::JobFailed {
        file_id: job.remote_file_id,
        error: error.to_string(),
        attempts,
    });
    Ok(())
}
