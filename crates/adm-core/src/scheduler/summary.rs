//! End-of-run accounting.

use std::fmt;
use std::time::Duration;

use crate::engine::TransferOutcome;

/// Structured summary printed when a run drains.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub deferred: u64,
    pub cancelled: u64,
    pub bytes_downloaded: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Completed { bytes } => {
                self.completed += 1;
                self.bytes_downloaded += bytes;
            }
            TransferOutcome::AlreadyDone => self.skipped += 1,
            TransferOutcome::Failed => self.failed += 1,
            TransferOutcome::Deferred => self.deferred += 1,
            TransferOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Average throughput over the whole run, bytes per second.
    pub fn throughput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_downloaded as f64 / secs
    }

    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.skipped + self.deferred + self.cancelled
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "completed={} failed={} skipped={} deferred={} cancelled={} bytes={} elapsed={:.1}s avg={:.0} B/s",
            self.completed,
            self.failed,
            self.skipped,
            self.deferred,
            self.cancelled,
            self.bytes_downloaded,
            self.elapsed.as_secs_f64(),
            self.throughput_bps(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_outcome_kind() {
        let mut s = RunSummary::default();
        s.record(TransferOutcome::Completed { bytes: 100 });
        s.record(TransferOutcome::Completed { bytes: 50 });
        s.record(TransferOutcome::Failed);
        s.record(TransferOutcome::AlreadyDone);
        s.record(TransferOutcome::Deferred);
        s.record(TransferOutcome::Cancelled);
        assert_eq!(s.completed, 2);
        assert_eq!(s.failed, 1);
        assert_eq!(s.skipped, 1);
        assert_eq!(s.deferred, 1);
        assert_eq!(s.cancelled, 1);
        assert_eq!(s.bytes_downloaded, 150);
        assert_eq!(s.total(), 6);
    }

    #[test]
    fn throughput_handles_zero_elapsed() {
        let s = RunSummary::default();
        assert_eq!(s.throughput_bps(), 0.0);
    }

    #[test]
    fn display_is_parseable() {
        let mut s = RunSummary::default();
        s.record(TransferOutcome::Completed { bytes: 1024 });
        s.elapsed = Duration::from_secs(2);
        let line = s.to_string();
        assert!(line.contains("completed=1"));
        assert!(line.contains("bytes=1024"));
    }
}
