//! Cooperative cancellation: a run-wide flag plus per-job abort tokens.
//!
//! The scheduler registers each dispatched job here; a signal handler (or
//! test) can request cancellation, and the transfer loop checks the token
//! between chunks. A cancelled DOWNLOADING job persists its byte checkpoint,
//! keeps its partial file, and releases its permit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Token observed by one in-flight transfer. The run-wide flag is folded in
/// so a global cancel reaches every job without a registry walk.
#[derive(Clone, Default)]
pub struct CancelToken {
    local: Arc<AtomicBool>,
    global: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.local.load(Ordering::Relaxed) || self.global.load(Ordering::Relaxed)
    }
}

/// Shared registry of remote_file_id -> abort token, plus the run-wide flag.
#[derive(Default)]
pub struct JobControl {
    global: Arc<AtomicBool>,
    jobs: Mutex<HashMap<i64, Arc<AtomicBool>>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a running job; returns the token to pass to the transfer.
    pub fn register(&self, remote_file_id: i64) -> CancelToken {
        let local = Arc::new(AtomicBool::new(false));
        self.jobs
            .lock()
            .unwrap()
            .insert(remote_file_id, Arc::clone(&local));
        CancelToken {
            local,
            global: Arc::clone(&self.global),
        }
    }

    /// Unregister a job (call when the job finishes, success or failure).
    pub fn unregister(&self, remote_file_id: i64) {
        self.jobs.lock().unwrap().remove(&remote_file_id);
    }

    /// Request abort for a single job.
    pub fn request_abort(&self, remote_file_id: i64) {
        if let Some(token) = self.jobs.lock().unwrap().get(&remote_file_id) {
            token.store(true, Ordering::Relaxed);
        }
    }

    /// Request cancellation of the whole run. In-flight transfers stop at
    /// their next chunk; queued jobs are not dispatched.
    pub fn cancel_all(&self) {
        self.global.store(true, Ordering::Relaxed);
    }

    pub fn is_run_cancelled(&self) -> bool {
        self.global.load(Ordering::Relaxed)
    }
}
