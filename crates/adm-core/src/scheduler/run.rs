//! Submission channel and worker loop.
//!
//! `submit` is a non-blocking enqueue; the run loop keeps up to the
//! governor's target in flight, refreshes that target periodically, and
//! aggregates outcomes into a [`RunSummary`]. A single job's failure never
//! cancels peers; only store/filesystem fatals abort the sweep.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::engine::{self, DownloaderCtx, TransferOutcome};
use crate::store::JobRecord;

use super::inflight::InFlightSet;
use super::permits::PermitGate;
use super::summary::RunSummary;

/// Cadence of governor refreshes; the governor itself rate-limits actual
/// sampling to its check interval.
const REFRESH_TICK: Duration = Duration::from_secs(1);

/// Cloneable submission handle.
#[derive(Clone)]
pub struct JobSender {
    tx: mpsc::UnboundedSender<JobRecord>,
}

impl JobSender {
    /// Non-blocking enqueue. Returns false if the run loop is gone.
    pub fn submit(&self, job: JobRecord) -> bool {
        self.tx.send(job).is_ok()
    }
}

/// The consuming half; `run` drives transfers until the queue drains.
pub struct SchedulerRun {
    ctx: Arc<DownloaderCtx>,
    rx: mpsc::UnboundedReceiver<JobRecord>,
    gate: Arc<PermitGate>,
    inflight: Arc<InFlightSet>,
}

/// Build a scheduler for one run. Drop every [`JobSender`] clone once
/// discovery finishes so the run loop can drain and return.
pub fn scheduler(ctx: Arc<DownloaderCtx>) -> (JobSender, SchedulerRun) {
    let (tx, rx) = mpsc::unbounded_channel();
    let gate = PermitGate::new(ctx.governor.target());
    (
        JobSender { tx },
        SchedulerRun {
            ctx,
            rx,
            gate,
            inflight: InFlightSet::new(),
        },
    )
}

impl SchedulerRun {
    pub async fn run(self) -> Result<RunSummary> {
        let SchedulerRun {
            ctx,
            mut rx,
            gate,
            inflight,
        } = self;

        let started = Instant::now();
        let mut summary = RunSummary::default();
        let mut tasks: JoinSet<Result<TransferOutcome>> = JoinSet::new();
        let mut tick = tokio::time::interval(REFRESH_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut queue_open = true;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    gate.set_target(ctx.governor.refresh());
                }
                job = rx.recv(), if queue_open => match job {
                    Some(job) => dispatch(&ctx, &gate, &inflight, job, &mut tasks, &mut summary),
                    None => queue_open = false,
                },
                joined = tasks.join_next(), if !tasks.is_empty() => {
                    if let Some(res) = joined {
                        let outcome = res.context("transfer task join")??;
                        summary.record(outcome);
                    }
                }
            }
            if !queue_open && tasks.is_empty() {
                break;
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!(%summary, "run drained");
        Ok(summary)
    }
}

fn dispatch(
    ctx: &Arc<DownloaderCtx>,
    gate: &Arc<PermitGate>,
    inflight: &Arc<InFlightSet>,
    job: JobRecord,
    tasks: &mut JoinSet<Result<TransferOutcome>>,
    summary: &mut RunSummary,
) {
    // At-most-one in-flight per identifier: a duplicate submission is a
    // no-op recorded as skipped.
    let Some(claim) = inflight.try_claim(job.remote_file_id) else {
        tracing::debug!(file_id = job.remote_file_id, "duplicate submission ignored");
        summary.record(TransferOutcome::AlreadyDone);
        return;
    };

    let ctx = Arc::clone(ctx);
    let gate = Arc::clone(gate);
    tasks.spawn(async move {
        let _permit = gate.acquire().await;
        let _claim = claim;
        engine::transfer(&ctx, job).await
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{
        ClientError, GroupDescriptor, ProgressFn, RemoteClient, RemoteFileRef, RemoteGroup,
        RemoteMessage,
    };
    use crate::config::AdmConfig;
    use crate::control::CancelToken;
    use crate::store::{JobDefaults, JobState, JobStore};
    use async_trait::async_trait;
    use std::path::Path;

    /// Serves `size` bytes of 0x5A for any requested file.
    struct ByteClient {
        size: u64,
    }

    #[async_trait]
    impl RemoteClient for ByteClient {
        async fn resolve_group(
            &self,
            _descriptor: &GroupDescriptor,
        ) -> Result<RemoteGroup, ClientError> {
            Err(ClientError::NotFound("stub".into()))
        }

        async fn iter_messages(
            &self,
            _group: &RemoteGroup,
            _limit: usize,
        ) -> Result<Vec<RemoteMessage>, ClientError> {
            Ok(Vec::new())
        }

        async fn download_file(
            &self,
            _file: &RemoteFileRef,
            dest: &Path,
            start_at: u64,
            progress: ProgressFn,
            _cancel: &CancelToken,
        ) -> Result<u64, ClientError> {
            let mut existing = if start_at > 0 {
                tokio::fs::read(dest).await.unwrap_or_default()
            } else {
                Vec::new()
            };
            existing.truncate(start_at as usize);
            existing.resize(self.size as usize, 0x5A);
            tokio::fs::write(dest, &existing).await?;
            progress(self.size);
            Ok(self.size)
        }
    }

    async fn ctx_with_client(size: u64, dir: &Path) -> (Arc<DownloaderCtx>, JobStore) {
        let store = JobStore::open_memory().await.unwrap();
        let cfg = AdmConfig::default();
        let client = Arc::new(ByteClient { size });
        let ctx = Arc::new(DownloaderCtx::new(
            &cfg,
            store.clone(),
            client,
            dir.to_path_buf(),
        ));
        (ctx, store)
    }

    async fn make_job(store: &JobStore, file_id: i64, size: u64, name: &str) -> JobRecord {
        let g = store.upsert_group(1, "G", None).await.unwrap();
        let (job, _) = store
            .get_or_create_job(&JobDefaults {
                remote_file_id: file_id,
                file_reference: format!("ref-{file_id}"),
                declared_size: size as i64,
                mime_type: Some("audio/mpeg".into()),
                duration_secs: None,
                title: None,
                performer: None,
                target_name: name.to_string(),
                group_ref: g.id,
            })
            .await
            .unwrap();
        job
    }

    #[tokio::test]
    async fn drains_submitted_jobs_and_reports() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = ctx_with_client(2048, dir.path()).await;
        let (sender, run) = scheduler(Arc::clone(&ctx));

        for i in 0..3 {
            let job = make_job(&store, i, 2048, &format!("f{i}.mp3")).await;
            assert!(sender.submit(job));
        }
        drop(sender);

        let summary = run.run().await.unwrap();
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 0);
        for i in 0..3 {
            assert!(dir.path().join(format!("f{i}.mp3")).exists());
            let j = store.get_job_by_file_id(i).await.unwrap().unwrap();
            assert_eq!(j.state, JobState::Completed);
            assert_eq!(j.bytes_downloaded, 2048);
        }
    }

    #[tokio::test]
    async fn duplicate_submission_transfers_once() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, store) = ctx_with_client(1024, dir.path()).await;
        let (sender, run) = scheduler(Arc::clone(&ctx));

        let job = make_job(&store, 7, 1024, "dup.mp3").await;
        assert!(sender.submit(job.clone()));
        assert!(sender.submit(job));
        drop(sender);

        let summary = run.run().await.unwrap();
        // One transfer; the duplicate is either dropped at dispatch or
        // observes COMPLETED immediately.
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.completed + summary.skipped, 2);
        let j = store.get_job_by_file_id(7).await.unwrap().unwrap();
        assert_eq!(j.state, JobState::Completed);
        assert_eq!(j.attempt_count, 1);
    }
}
