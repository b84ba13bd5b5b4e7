//! Read-side queries: lookups for the engine and reports for the CLI.

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::store::db::JobStore;
use crate::store::types::{
    GroupRecord, GroupSummary, JobId, JobRecord, JobState, StateCounts, StoreStats,
};

pub(crate) fn job_from_row(row: &SqliteRow) -> JobRecord {
    let state_str: String = row.get("state");
    JobRecord {
        id: row.get("id"),
        remote_file_id: row.get("remote_file_id"),
        file_reference: row.get("file_reference"),
        declared_size: row.get("declared_size"),
        mime_type: row.get("mime_type"),
        duration_secs: row.get("duration_secs"),
        title: row.get("title"),
        performer: row.get("performer"),
        target_name: row.get("target_name"),
        bytes_downloaded: row.get("bytes_downloaded"),
        state: JobState::from_str(&state_str),
        digest: row.get("digest"),
        attempt_count: row.get("attempt_count"),
        last_attempt_at: row.get("last_attempt_at"),
        last_error: row.get("last_error"),
        group_ref: row.get("group_ref"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn group_from_row(row: &SqliteRow) -> GroupRecord {
    GroupRecord {
        id: row.get("id"),
        remote_id: row.get("remote_id"),
        title: row.get("title"),
        handle: row.get("handle"),
    }
}

const JOB_COLUMNS: &str = "id, remote_file_id, file_reference, declared_size, mime_type, \
     duration_secs, title, performer, target_name, bytes_downloaded, state, digest, \
     attempt_count, last_attempt_at, last_error, group_ref, created_at, updated_at";

impl JobStore {
    /// Fetch a job by row id.
    pub async fn get_job(&self, id: JobId) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| job_from_row(&r)))
    }

    /// Fetch a job by its remote file identifier.
    pub async fn get_job_by_file_id(&self, remote_file_id: i64) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE remote_file_id = ?1"
        ))
        .bind(remote_file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| job_from_row(&r)))
    }

    /// A FAILED job with saved progress, or None.
    pub async fn load_resumable(&self, remote_file_id: i64) -> Result<Option<JobRecord>> {
        Ok(self
            .get_job_by_file_id(remote_file_id)
            .await?
            .filter(JobRecord::is_resumable))
    }

    /// All remote file ids with state COMPLETED; seeds the identifier cache.
    pub async fn iter_completed_ids(&self) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT remote_file_id FROM jobs WHERE state = 'completed'")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("remote_file_id")).collect())
    }

    /// Jobs stuck in DOWNLOADING (no in-flight process exists at startup).
    pub async fn list_downloading(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE state = 'downloading' ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Non-terminal jobs, oldest first (the retry sweep order).
    pub async fn list_pending_or_failed(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE state IN ('pending', 'failed') ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Failed jobs with diagnostics for the end-of-run report.
    pub async fn list_failed(&self) -> Result<Vec<JobRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE state = 'failed' ORDER BY updated_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Job owning a target name, if any (used by the orphan sweep).
    pub async fn get_job_by_target_name(&self, target_name: &str) -> Result<Option<JobRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE target_name = ?1 LIMIT 1"
        ))
        .bind(target_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| job_from_row(&r)))
    }

    /// Whether any job already claims this target name.
    pub async fn target_name_taken(&self, target_name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM jobs WHERE target_name = ?1 LIMIT 1")
            .bind(target_name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Case-insensitive substring search over title, performer, and target
    /// name. Read-only; used by `adm search`.
    pub async fn search_jobs(&self, query: &str) -> Result<Vec<JobRecord>> {
        let pattern = format!("%{}%", query);
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs \
             WHERE title LIKE ?1 OR performer LIKE ?1 OR target_name LIKE ?1 \
             ORDER BY updated_at DESC"
        ))
        .bind(&pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(job_from_row).collect())
    }

    /// Aggregate counts and byte totals for `adm stats` / `adm performance`.
    pub async fn stats(&self) -> Result<StoreStats> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS n FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;
        let mut counts = StateCounts::default();
        for row in &rows {
            let state: String = row.get("state");
            let n: i64 = row.get("n");
            let n = n as u64;
            match JobState::from_str(&state) {
                JobState::Pending => counts.pending = n,
                JobState::Downloading => counts.downloading = n,
                JobState::Completed => counts.completed = n,
                JobState::Failed => counts.failed = n,
                JobState::Skipped => counts.skipped = n,
            }
        }

        let row = sqlx::query(
            "SELECT COALESCE(SUM(bytes_downloaded), 0) AS bytes, \
                    COALESCE(AVG(attempt_count), 0.0) AS avg_attempts \
             FROM jobs WHERE state = 'completed'",
        )
        .fetch_one(&self.pool)
        .await?;
        let completed_bytes: i64 = row.get("bytes");
        let avg_attempts_completed: f64 = row.get("avg_attempts");

        Ok(StoreStats {
            counts,
            completed_bytes: completed_bytes as u64,
            avg_attempts_completed,
        })
    }

    /// All groups with per-group job counts, newest first.
    pub async fn list_groups(&self) -> Result<Vec<GroupSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.remote_id, g.title, g.handle,
                   COUNT(j.id) AS total_jobs,
                   COALESCE(SUM(CASE WHEN j.state = 'completed' THEN 1 ELSE 0 END), 0) AS completed_jobs
            FROM groups g
            LEFT JOIN jobs j ON j.group_ref = g.id
            GROUP BY g.id
            ORDER BY g.created_at DESC, g.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let total: i64 = row.get("total_jobs");
            let completed: i64 = row.get("completed_jobs");
            out.push(GroupSummary {
                group: group_from_row(row),
                total_jobs: total as u64,
                completed_jobs: completed as u64,
            });
        }
        Ok(out)
    }

    /// Group lookup by wire id.
    pub async fn get_group_by_remote_id(&self, remote_id: i64) -> Result<Option<GroupRecord>> {
        let row =
            sqlx::query("SELECT id, remote_id, title, handle FROM groups WHERE remote_id = ?1")
                .bind(remote_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| group_from_row(&r)))
    }
}
