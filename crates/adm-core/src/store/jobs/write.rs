//! Write-side operations: every state transition is persisted (and thereby
//! flushed by SQLite) before the call returns.

use anyhow::{Context, Result};

use crate::store::db::{unix_timestamp, JobStore};
use crate::store::types::{GroupRecord, JobDefaults, JobId, JobRecord, JobState};

impl JobStore {
    /// Insert or refresh a group; returns the stored row.
    pub async fn upsert_group(
        &self,
        remote_id: i64,
        title: &str,
        handle: Option<&str>,
    ) -> Result<GroupRecord> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            INSERT INTO groups (remote_id, title, handle, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(remote_id) DO UPDATE SET
                title = excluded.title,
                handle = excluded.handle,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(remote_id)
        .bind(title)
        .bind(handle)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_group_by_remote_id(remote_id)
            .await?
            .context("group row missing after upsert")
    }

    /// Fetch the job for `defaults.remote_file_id`, creating it in PENDING
    /// if absent. Returns the row and whether it was newly created. The
    /// unique index on `remote_file_id` makes this race-safe.
    pub async fn get_or_create_job(&self, defaults: &JobDefaults) -> Result<(JobRecord, bool)> {
        let now = unix_timestamp();
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs (
                remote_file_id, file_reference, declared_size, mime_type,
                duration_secs, title, performer, target_name,
                bytes_downloaded, state, attempt_count,
                group_ref, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, 0, ?10, ?11, ?11)
            "#,
        )
        .bind(defaults.remote_file_id)
        .bind(&defaults.file_reference)
        .bind(defaults.declared_size)
        .bind(&defaults.mime_type)
        .bind(defaults.duration_secs)
        .bind(&defaults.title)
        .bind(&defaults.performer)
        .bind(&defaults.target_name)
        .bind(JobState::Pending.as_str())
        .bind(defaults.group_ref)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let job = self
            .get_job_by_file_id(defaults.remote_file_id)
            .await?
            .context("job row missing after insert")?;
        Ok((job, inserted > 0))
    }

    /// Transition to DOWNLOADING: bumps the attempt counter and stamps the
    /// attempt time.
    pub async fn mark_downloading(&self, id: JobId) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'downloading',
                attempt_count = attempt_count + 1,
                last_attempt_at = ?1,
                updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Durable byte checkpoint. `MAX` keeps progress monotone even if a
    /// late writer races a newer checkpoint.
    pub async fn checkpoint_bytes(&self, id: JobId, bytes: u64) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET bytes_downloaded = MAX(bytes_downloaded, ?1),
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(bytes as i64)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Commit COMPLETED: final size, digest, cleared error.
    pub async fn mark_completed(&self, id: JobId, total_bytes: u64, digest: &str) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'completed',
                bytes_downloaded = ?1,
                digest = ?2,
                last_error = NULL,
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(total_bytes as i64)
        .bind(digest)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Transition to FAILED with a diagnostic. An optional final byte count
    /// is checkpointed monotonically (resumable failures keep progress).
    pub async fn mark_failed(&self, id: JobId, error: &str, bytes: Option<u64>) -> Result<()> {
        let now = unix_timestamp();
        if let Some(b) = bytes {
            self.checkpoint_bytes(id, b).await?;
        }
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed',
                last_error = ?1,
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Discovery-only transition for files already present in the library.
    pub async fn mark_skipped(&self, id: JobId, digest: Option<&str>) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'skipped',
                digest = COALESCE(?1, digest),
                updated_at = ?2
            WHERE id = ?3
            "#,
        )
        .bind(digest)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Discard saved progress (stale partial or integrity failure). The
    /// monotone-bytes rule applies within a download, not across an
    /// explicit reset.
    pub async fn reset_progress(&self, id: JobId) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE jobs
            SET bytes_downloaded = 0,
                digest = NULL,
                state = 'pending',
                updated_at = ?1
            WHERE id = ?2
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Crash recovery: any job left in DOWNLOADING becomes FAILED-resumable
    /// (no in-flight process exists at startup). Returns rows affected.
    pub async fn recover_stale_downloading(&self) -> Result<u64> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE jobs
            SET state = 'failed',
                last_error = 'interrupted',
                updated_at = ?1
            WHERE state = 'downloading'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}
