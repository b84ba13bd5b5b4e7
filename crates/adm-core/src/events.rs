//! Event fan-out to pluggable sinks.
//!
//! Sinks are plain closures; delivery is best-effort and synchronous. A
//! panicking sink is caught and logged so it cannot affect other sinks or
//! the publisher. Progress events are throttled to roughly one per second
//! per job.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Structured events emitted by the engine and scheduler.
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    JobStarted {
        file_id: i64,
        target_name: String,
        declared_size: u64,
    },
    JobProgress {
        file_id: i64,
        bytes_downloaded: u64,
        declared_size: u64,
    },
    JobCompleted {
        file_id: i64,
        bytes: u64,
        elapsed: Duration,
        /// Bytes per second over this run's transferred portion.
        throughput_bps: f64,
    },
    JobFailed {
        file_id: i64,
        error: String,
        attempts: u32,
    },
    RateLimitEngaged {
        wait_secs: u64,
        new_rate: f64,
    },
    RecoveryAttempted {
        file_id: i64,
    },
    ResourcePressure {
        reason: String,
    },
}

type Sink = Box<dyn Fn(&DownloadEvent) + Send + Sync>;

/// Publish-subscribe bus with best-effort delivery.
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<Sink>>,
    progress_last: Mutex<HashMap<i64, Instant>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sink. Sinks live for the bus's lifetime.
    pub fn subscribe<F>(&self, sink: F)
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        self.sinks.write().unwrap().push(Box::new(sink));
    }

    /// Deliver an event to every sink, isolating panics.
    pub fn publish(&self, event: &DownloadEvent) {
        let sinks = self.sinks.read().unwrap();
        for sink in sinks.iter() {
            if catch_unwind(AssertUnwindSafe(|| sink(event))).is_err() {
                tracing::warn!("event sink panicked; continuing with remaining sinks");
            }
        }
    }

    /// Progress publisher with per-job throttling (~1 event/second).
    pub fn publish_progress(&self, file_id: i64, bytes_downloaded: u64, declared_size: u64) {
        {
            let mut last = self.progress_last.lock().unwrap();
            let now = Instant::now();
            match last.get(&file_id) {
                Some(prev) if now.duration_since(*prev) < PROGRESS_INTERVAL => return,
                _ => {
                    last.insert(file_id, now);
                }
            }
        }
        self.publish(&DownloadEvent::JobProgress {
            file_id,
            bytes_downloaded,
            declared_size,
        });
    }

    /// Forget a job's throttle entry once it reaches a terminal state.
    pub fn clear_progress(&self, file_id: i64) {
        self.progress_last.lock().unwrap().remove(&file_id);
    }
}
