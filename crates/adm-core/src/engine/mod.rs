//! Per-job transfer state machine.
//!
//! PENDING → DOWNLOADING → {COMPLETED | FAILED}; FAILED with saved progress
//! resumes on the next sweep. The procedure per job: admission (disk gate,
//! attempt ceiling) → rate limit → resume decision → stream with durable
//! checkpoints → verify → atomic publish. Error handling is tabled in
//! [`error`]; one place decides retry vs terminal.

mod error;
mod finish;
mod resume;
mod stream;

pub use error::{retry_decision, RetryDecision, TransferError};

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::IdCache;
use crate::client::RemoteClient;
use crate::config::AdmConfig;
use crate::control::{CancelToken, JobControl};
use crate::events::{DownloadEvent, EventBus};
use crate::governor::ResourceGovernor;
use crate::limiter::RateLimiter;
use crate::store::{JobRecord, JobStore};

/// How one dispatched job ended, for the run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed { bytes: u64 },
    /// Submitted twice or raced to terminal state before dispatch.
    AlreadyDone,
    Failed,
    /// Refused by the governor or run cancellation before any attempt;
    /// no attempt was consumed.
    Deferred,
    Cancelled,
}

/// Everything a transfer needs, threaded explicitly instead of process
/// globals. Lifetime is one downloader run.
pub struct DownloaderCtx {
    pub store: JobStore,
    pub client: Arc<dyn RemoteClient>,
    pub limiter: Arc<RateLimiter>,
    pub governor: Arc<ResourceGovernor>,
    pub cache: Arc<IdCache>,
    pub events: Arc<EventBus>,
    pub control: Arc<JobControl>,
    pub library_root: PathBuf,
    pub per_download_timeout: Duration,
    /// Retries within one invocation of the engine.
    pub retry_limit: u32,
    /// Cumulative per-job attempt ceiling across runs.
    pub attempt_ceiling: i64,
}

impl DownloaderCtx {
    pub fn new(
        cfg: &AdmConfig,
        store: JobStore,
        client: Arc<dyn RemoteClient>,
        library_root: PathBuf,
    ) -> Self {
        Self {
            store,
            client,
            limiter: Arc::new(RateLimiter::new(cfg.rate_initial, cfg.rate_burst)),
            governor: Arc::new(ResourceGovernor::new(cfg, library_root.clone())),
            cache: Arc::new(IdCache::new(cfg.identifier_cache_capacity)),
            events: Arc::new(EventBus::new()),
            control: Arc::new(JobControl::new()),
            library_root,
            per_download_timeout: Duration::from_secs(cfg.per_download_timeout_seconds.max(1)),
            retry_limit: 3,
            attempt_ceiling: 10,
        }
    }

    /// Seed the identifier cache from the store's completed rows.
    pub async fn seed_cache(&self) -> Result<()> {
        let ids = self.store.iter_completed_ids().await?;
        let n = ids.len();
        self.cache.seed(ids);
        tracing::debug!(completed = n, "identifier cache seeded");
        Ok(())
    }
}

/// Run the state machine for one job. Errors returned here are store or
/// filesystem failures that should abort the sweep; per-job download
/// failures come back as [`TransferOutcome::Failed`].
pub async fn transfer(ctx: &DownloaderCtx, job: JobRecord) -> Result<TransferOutcome> {
    // The submitted record may be stale (a duplicate queued behind the
    // transfer that completed it); decide on the stored row.
    let job = ctx.store.get_job(job.id).await?.unwrap_or(job);
    let declared = job.declared_size.max(0) as u64;

    if job.state.is_terminal() || ctx.cache.has(job.remote_file_id) {
        return Ok(TransferOutcome::AlreadyDone);
    }
    if ctx.control.is_run_cancelled() {
        return Ok(TransferOutcome::Deferred);
    }

    // Cumulative ceiling: stop re-attempting a job that keeps failing.
    if job.attempt_count >= ctx.attempt_ceiling {
        let msg = format!("attempt ceiling ({}) exceeded", ctx.attempt_ceiling);
        ctx.store.mark_failed(job.id, &msg, None).await?;
        finish::publish_failed(ctx, &job, &msg).await?;
        return Ok(TransferOutcome::Failed);
    }

    // Admission: disk gate. Deferral costs no attempt and writes nothing.
    if !ctx.governor.can_start(declared) {
        ctx.events.publish(&DownloadEvent::ResourcePressure {
            reason: format!(
                "free disk below declared size {} + reserve for {}",
                declared, job.target_name
            ),
        });
        tracing::warn!(job = job.id, "deferred: insufficient free disk");
        return Ok(TransferOutcome::Deferred);
    }

    ctx.limiter
        .acquire(RateLimiter::weight_for_size(declared))
        .await;

    let partial = job.partial_path(&ctx.library_root);
    let final_path = job.final_path(&ctx.library_root);
    let start_byte = resume::resume_start_byte(&ctx.store, &job, &partial).await?;

    ctx.store.mark_downloading(job.id).await?;
    ctx.events.publish(&DownloadEvent::JobStarted {
        file_id: job.remote_file_id,
        target_name: job.target_name.clone(),
        declared_size: declared,
    });
    let started = Instant::now();

    if declared == 0 {
        return finish::complete_empty(ctx, &job, &partial, &final_path).await;
    }

    let cancel = ctx.control.register(job.remote_file_id);
    let result = attempt_loop(ctx, &job, &partial, start_byte, &cancel).await;
    ctx.control.unregister(job.remote_file_id);
    ctx.events.clear_progress(job.remote_file_id);

    match result {
        Ok(()) => finish::finalize(ctx, &job, &partial, &final_path, started, start_byte).await,
        Err(err) => handle_failure(ctx, &job, &partial, err).await,
    }
}

/// Retry loop around single streaming attempts. Flood waits adjust the
/// limiter; transport errors back off exponentially; everything else gives
/// up immediately.
async fn attempt_loop(
    ctx: &DownloaderCtx,
    job: &JobRecord,
    partial: &Path,
    mut start_byte: u64,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let mut attempt = 1u32;
    loop {
        match stream::stream_once(ctx, job, partial, start_byte, cancel).await {
            Ok(_total) => return Ok(()),
            Err(err) => {
                if let TransferError::FlowControl { seconds } = &err {
                    ctx.limiter.adjust(*seconds);
                    ctx.events.publish(&DownloadEvent::RateLimitEngaged {
                        wait_secs: *seconds,
                        new_rate: ctx.limiter.current_rate(),
                    });
                }
                match retry_decision(&err, attempt, ctx.retry_limit) {
                    RetryDecision::GiveUp => return Err(err),
                    RetryDecision::RetryAfter(delay) => {
                        // Persist whatever landed on disk before sleeping,
                        // then resume from there.
                        if let Ok(meta) = tokio::fs::metadata(partial).await {
                            let _ = ctx.store.checkpoint_bytes(job.id, meta.len()).await;
                            start_byte = meta.len();
                        }
                        tracing::info!(
                            job = job.id,
                            attempt,
                            delay_secs = delay.as_secs(),
                            error = %err,
                            "retrying after error"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}

async fn handle_failure(
    ctx: &DownloaderCtx,
    job: &JobRecord,
    partial: &Path,
    err: TransferError,
) -> Result<TransferOutcome> {
    let on_disk = tokio::fs::metadata(partial).await.map(|m| m.len()).ok();
    let msg = err.to_string();
    ctx.store.mark_failed(job.id, &msg, on_disk).await?;

    if matches!(err, TransferError::Cancelled) {
        tracing::info!(job = job.id, "cancelled; progress kept for resume");
        return Ok(TransferOutcome::Cancelled);
    }

    finish::publish_failed(ctx, job, &msg).await?;
    Ok(TransferOutcome::Failed)
}
