//! SQLite-backed job database: open, migrate, shared helpers.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Handle to the SQLite-backed job database.
///
/// The default database file lives under the XDG state directory:
/// `~/.local/state/adm/jobs.db`.
#[derive(Clone)]
pub struct JobStore {
    pub(crate) pool: Pool<Sqlite>,
}

impl JobStore {
    /// Open (or create) the default job database and run migrations.
    pub async fn open_default() -> Result<Self> {
        let xdg_dirs = xdg::BaseDirectories::with_prefix("adm")?;
        let state_dir = xdg_dirs.get_state_home();
        tokio::fs::create_dir_all(&state_dir).await?;
        Self::open(&state_dir.join("jobs.db")).await
    }

    /// Open (or create) a job database at an explicit path.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("open job store at {}", path.display()))?;

        let db = JobStore { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database for tests and tooling. A single connection so the
    /// pool never hands back a different empty database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = JobStore { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_id INTEGER NOT NULL UNIQUE,
                title TEXT NOT NULL,
                handle TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                remote_file_id INTEGER NOT NULL,
                file_reference TEXT NOT NULL,
                declared_size INTEGER NOT NULL,
                mime_type TEXT,
                duration_secs INTEGER,
                title TEXT,
                performer TEXT,
                target_name TEXT NOT NULL,
                bytes_downloaded INTEGER NOT NULL DEFAULT 0,
                state TEXT NOT NULL,
                digest TEXT,
                attempt_count INTEGER NOT NULL DEFAULT 0,
                last_attempt_at INTEGER,
                last_error TEXT,
                group_ref INTEGER NOT NULL REFERENCES groups(id),
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_remote_file_id ON jobs(remote_file_id);",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_group_ref ON jobs(group_ref);")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

pub(crate) fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
