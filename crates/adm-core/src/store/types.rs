//! Types used by the job database.

use std::path::{Path, PathBuf};

/// Local job identifier (row id).
pub type JobId = i64;

/// Sidecar suffix for in-progress files.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Lifecycle state stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Downloading,
    Completed,
    Failed,
    Skipped,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Downloading => "downloading",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => JobState::Pending,
            "downloading" => JobState::Downloading,
            "completed" => JobState::Completed,
            "skipped" => JobState::Skipped,
            _ => JobState::Failed,
        }
    }

    /// Terminal states are never dispatched again by this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Skipped)
    }
}

/// A discovered group/channel. `remote_id` is the wire identifier;
/// `id` is the local row referenced by `jobs.group_ref`.
#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub id: i64,
    pub remote_id: i64,
    pub title: String,
    pub handle: Option<String>,
}

/// Full job row used by the scheduler and transfer engine.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub remote_file_id: i64,
    pub file_reference: String,
    pub declared_size: i64,
    pub mime_type: Option<String>,
    pub duration_secs: Option<i64>,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub target_name: String,
    pub bytes_downloaded: i64,
    pub state: JobState,
    pub digest: Option<String>,
    pub attempt_count: i64,
    pub last_attempt_at: Option<i64>,
    pub last_error: Option<String>,
    pub group_ref: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl JobRecord {
    /// Destination under the library root.
    pub fn final_path(&self, library_root: &Path) -> PathBuf {
        library_root.join(&self.target_name)
    }

    /// Sidecar receiving bytes while DOWNLOADING.
    pub fn partial_path(&self, library_root: &Path) -> PathBuf {
        library_root.join(format!("{}{}", self.target_name, PARTIAL_SUFFIX))
    }

    /// FAILED with saved progress can resume from its checkpoint.
    pub fn is_resumable(&self) -> bool {
        self.state == JobState::Failed && self.bytes_downloaded > 0
    }
}

/// Fields fixed at job creation (from the discovered message).
#[derive(Debug, Clone)]
pub struct JobDefaults {
    pub remote_file_id: i64,
    pub file_reference: String,
    pub declared_size: i64,
    pub mime_type: Option<String>,
    pub duration_secs: Option<i64>,
    pub title: Option<String>,
    pub performer: Option<String>,
    pub target_name: String,
    pub group_ref: i64,
}

/// Per-state row counts for the CLI `stats` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateCounts {
    pub pending: u64,
    pub downloading: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl StateCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.downloading + self.completed + self.failed + self.skipped
    }
}

/// Aggregate figures over the whole store.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub counts: StateCounts,
    pub completed_bytes: u64,
    /// Mean attempt count over completed jobs (0.0 when none).
    pub avg_attempts_completed: f64,
}

/// One line of the CLI `groups` listing.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub group: GroupRecord,
    pub total_jobs: u64,
    pub completed_jobs: u64,
}
