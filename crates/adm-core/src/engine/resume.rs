//! Resume decision: trust saved progress only when the partial file on
//! disk matches the checkpoint exactly; anything else restarts from zero.

use anyhow::{Context, Result};
use std::path::Path;

use crate::store::{JobRecord, JobStore};

/// Where to start streaming for this job. Deletes a stale partial (size
/// mismatch or missing checkpoint) and resets the stored progress.
pub(super) async fn resume_start_byte(
    store: &JobStore,
    job: &JobRecord,
    partial_path: &Path,
) -> Result<u64> {
    let checkpoint = job.bytes_downloaded.max(0) as u64;

    if checkpoint > 0 {
        if let Ok(meta) = tokio::fs::metadata(partial_path).await {
            if meta.len() == checkpoint {
                tracing::debug!(
                    job = job.id,
                    start = checkpoint,
                    "resuming from saved checkpoint"
                );
                return Ok(checkpoint);
            }
            tracing::warn!(
                job = job.id,
                checkpoint,
                on_disk = meta.len(),
                "partial file does not match checkpoint; restarting"
            );
        }
    }

    if tokio::fs::metadata(partial_path).await.is_ok() {
        tokio::fs::remove_file(partial_path)
            .await
            .with_context(|| format!("remove stale partial {}", partial_path.display()))?;
    }
    if checkpoint > 0 {
        store.reset_progress(job.id).await?;
    }
    Ok(0)
}
