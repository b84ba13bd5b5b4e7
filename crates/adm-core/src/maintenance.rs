//! Startup recovery and library hygiene.
//!
//! Runs before discovery: heal jobs that crashed between rename and
//! commit, demote stale DOWNLOADING rows to FAILED-resumable, and sweep
//! partial files no live job owns.

use anyhow::Result;

use crate::digest;
use crate::engine::DownloaderCtx;
use crate::events::DownloadEvent;
use crate::store::{JobState, PARTIAL_SUFFIX};

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaintenanceReport {
    /// Rename-committed jobs whose COMPLETED transition was re-verified
    /// and persisted.
    pub healed: u64,
    /// DOWNLOADING rows demoted to FAILED-resumable.
    pub recovered: u64,
    /// Orphan `.partial` files deleted.
    pub swept: u64,
}

/// Full startup pass: heal, recover, sweep.
pub async fn run_startup(ctx: &DownloaderCtx) -> Result<MaintenanceReport> {
    let mut report = MaintenanceReport::default();
    report.healed = heal_renamed(ctx).await?;
    report.recovered = ctx.store.recover_stale_downloading().await?;
    report.swept = sweep_orphan_partials(ctx).await?;
    if report.healed + report.recovered + report.swept > 0 {
        tracing::info!(
            healed = report.healed,
            recovered = report.recovered,
            swept = report.swept,
            "startup maintenance finished"
        );
    }
    Ok(report)
}

/// A crash between the partial→final rename and the COMPLETED commit
/// leaves a DOWNLOADING row whose final file exists and whose partial is
/// gone. Re-verify the bytes and commit the transition.
async fn heal_renamed(ctx: &DownloaderCtx) -> Result<u64> {
    let mut healed = 0u64;
    for job in ctx.store.list_downloading().await? {
        let final_path = job.final_path(&ctx.library_root);
        let partial_path = job.partial_path(&ctx.library_root);
        if tokio::fs::metadata(&partial_path).await.is_ok() {
            continue;
        }
        let Ok(meta) = tokio::fs::metadata(&final_path).await else {
            continue;
        };
        if meta.len() != job.declared_size.max(0) as u64 {
            continue;
        }

        ctx.events.publish(&DownloadEvent::RecoveryAttempted {
            file_id: job.remote_file_id,
        });
        let digest = {
            let path = final_path.clone();
            tokio::task::spawn_blocking(move || digest::md5_path(&path)).await??
        };
        ctx.store
            .mark_completed(job.id, meta.len(), &digest)
            .await?;
        ctx.cache.insert(job.remote_file_id);
        healed += 1;
        tracing::info!(
            job = job.id,
            "healed interrupted completion: {}",
            final_path.display()
        );
    }
    Ok(healed)
}

/// Delete `.partial` files in the library that no non-terminal job owns.
async fn sweep_orphan_partials(ctx: &DownloaderCtx) -> Result<u64> {
    let mut swept = 0u64;
    let Ok(mut entries) = tokio::fs::read_dir(&ctx.library_root).await else {
        return Ok(0);
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(target_name) = name.strip_suffix(PARTIAL_SUFFIX) else {
            continue;
        };
        if keeps_partial(ctx, target_name).await? {
            continue;
        }
        if tokio::fs::remove_file(&path).await.is_ok() {
            swept += 1;
            tracing::debug!("swept orphan partial {}", path.display());
        }
    }
    Ok(swept)
}

async fn keeps_partial(ctx: &DownloaderCtx, target_name: &str) -> Result<bool> {
    let Some(job) = ctx.store.get_job_by_target_name(target_name).await? else {
        return Ok(false);
    };
    Ok(matches!(
        job.state,
        JobState::Pending | JobState::Downloading | JobState::Failed
    ))
}

/// Helper for building partial paths in tests and tools.
pub fn partial_name(target_name: &str) -> String {
    format!("{target_name}{PARTIAL_SUFFIX}")
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
    use crate::store::{JobDefaults, JobStore};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Arc;

    struct NullClient;

    #[async_trait]
    impl RemoteClient for NullClient {
        async fn resolve_group(
            &self,
            _descriptor: &GroupDescriptor,
        ) -> Result<RemoteGroup, ClientError> {
            Err(ClientError::NotFound("null".into()))
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
            _dest: &Path,
            _start_at: u64,
            _progress: ProgressFn,
            _cancel: &CancelToken,
        ) -> Result<u64, ClientError> {
            Err(ClientError::Transport("null".into()))
        }
    }

    async fn ctx(dir: &Path) -> DownloaderCtx {
        let store = JobStore::open_memory().await.unwrap();
        DownloaderCtx::new(
            &AdmConfig::default(),
            store,
            Arc::new(NullClient),
            dir.to_path_buf(),
        )
    }

    async fn make_job(ctx: &DownloaderCtx, file_id: i64, size: u64, name: &str) -> i64 {
        let g = ctx.store.upsert_group(1, "G", None).await.unwrap();
        let (job, _) = ctx
            .store
            .get_or_create_job(&JobDefaults {
                remote_file_id: file_id,
                file_reference: "r".to_string(),
                declared_size: size as i64,
                mime_type: None,
                duration_secs: None,
                title: None,
                performer: None,
                target_name: name.to_string(),
                group_ref: g.id,
            })
            .await
            .unwrap();
        job.id
    }

    #[tokio::test]
    async fn heals_rename_commit_crash_window() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path()).await;
        let id = make_job(&ctx, 10, 6, "a.mp3").await;
        ctx.store.mark_downloading(id).await.unwrap();
        // Simulate the crash: final present with the declared bytes, no
        // partial, row still DOWNLOADING.
        tokio::fs::write(dir.path().join("a.mp3"), b"hello\n")
            .await
            .unwrap();

        let report = run_startup(&ctx).await.unwrap();
        assert_eq!(report.healed, 1);
        assert_eq!(report.recovered, 0);

        let job = ctx.store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.digest.as_deref(), Some("b1946ac92492d2347c6235b4d2611184"));
        assert!(ctx.cache.has(10));
    }

    #[tokio::test]
    async fn stale_downloading_becomes_failed_resumable() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path()).await;
        let id = make_job(&ctx, 10, 1000, "a.mp3").await;
        ctx.store.mark_downloading(id).await.unwrap();
        ctx.store.checkpoint_bytes(id, 400).await.unwrap();
        tokio::fs::write(dir.path().join(partial_name("a.mp3")), vec![0u8; 400])
            .await
            .unwrap();

        let report = run_startup(&ctx).await.unwrap();
        assert_eq!(report.recovered, 1);
        assert_eq!(report.swept, 0, "live partial must survive the sweep");

        let job = ctx.store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.is_resumable());
        assert!(dir.path().join(partial_name("a.mp3")).exists());
    }

    #[tokio::test]
    async fn orphan_partials_are_swept() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path()).await;
        // No job at all for this partial.
        tokio::fs::write(dir.path().join("ghost.mp3.partial"), b"junk")
            .await
            .unwrap();
        // Terminal job: its partial is garbage too.
        let id = make_job(&ctx, 10, 4, "done.mp3").await;
        ctx.store.mark_completed(id, 4, "aa").await.unwrap();
        tokio::fs::write(dir.path().join("done.mp3.partial"), b"junk")
            .await
            .unwrap();

        let report = run_startup(&ctx).await.unwrap();
        assert_eq!(report.swept, 2);
        assert!(!dir.path().join("ghost.mp3.partial").exists());
        assert!(!dir.path().join("done.mp3.partial").exists());
    }

    #[tokio::test]
    async fn empty_library_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx(dir.path()).await;
        let report = run_startup(&ctx).await.unwrap();
        assert_eq!(report.healed + report.recovered + report.swept, 0);
    }
}
