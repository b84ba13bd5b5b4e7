//! Resource governor: adaptive concurrency target and pre-download gate.
//!
//! Samples CPU, memory, and process RSS at most once per check interval and
//! steps the target concurrency between the configured watermarks. Exposes
//! a disk gate consulted before each transfer, and runs registered cleanup
//! hooks as one coalesced pass when RSS crosses the soft ceiling.

mod sample;

pub use sample::{statvfs_available, ResourceSample, ResourceSampler, SystemSampler};

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::AdmConfig;

const HISTORY_LEN: usize = 32;

type CleanupHook = Box<dyn Fn() + Send + Sync>;

struct GovernorInner {
    sampler: Box<dyn ResourceSampler>,
    target: usize,
    history: VecDeque<ResourceSample>,
    last_sample_at: Option<Instant>,
    last_cleanup_at: Option<Instant>,
}

pub struct ResourceGovernor {
    min: usize,
    max: usize,
    cpu_high: f32,
    cpu_low: f32,
    mem_high: f32,
    mem_low: f32,
    check_interval: Duration,
    disk_reserve: u64,
    rss_ceiling: u64,
    library_root: PathBuf,
    inner: Mutex<GovernorInner>,
    cleanup_hooks: Mutex<Vec<CleanupHook>>,
}

impl ResourceGovernor {
    pub fn new(cfg: &AdmConfig, library_root: PathBuf) -> Self {
        Self::with_sampler(cfg, library_root, Box::new(SystemSampler::new()))
    }

    pub fn with_sampler(
        cfg: &AdmConfig,
        library_root: PathBuf,
        sampler: Box<dyn ResourceSampler>,
    ) -> Self {
        let min = cfg.min_concurrent_downloads.max(1);
        let max = cfg.max_concurrent_downloads.max(min);
        Self {
            min,
            max,
            cpu_high: cfg.cpu_high,
            cpu_low: cfg.cpu_low,
            mem_high: cfg.mem_high,
            mem_low: cfg.mem_low,
            check_interval: Duration::from_secs(cfg.check_interval_seconds.max(1)),
            disk_reserve: cfg.disk_reserve_bytes(),
            rss_ceiling: cfg.max_memory_mb * 1024 * 1024,
            library_root,
            inner: Mutex::new(GovernorInner {
                sampler,
                target: cfg.initial_target().clamp(min, max),
                history: VecDeque::new(),
                last_sample_at: None,
                last_cleanup_at: None,
            }),
            cleanup_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Current advisory concurrency target.
    pub fn target(&self) -> usize {
        self.inner.lock().unwrap().target
    }

    /// Register a cleanup hook run under memory pressure (flush caches,
    /// drop pooled buffers).
    pub fn register_cleanup<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cleanup_hooks.lock().unwrap().push(Box::new(hook));
    }

    /// Sample (rate-limited to the check interval) and recompute the
    /// target. Returns the possibly-updated target.
    pub fn refresh(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        if let Some(last) = inner.last_sample_at {
            if now.duration_since(last) < self.check_interval {
                return inner.target;
            }
        }
        inner.last_sample_at = Some(now);

        let s = inner.sampler.sample();
        inner.history.push_back(s);
        if inner.history.len() > HISTORY_LEN {
            inner.history.pop_front();
        }

        let mut target = inner.target;
        if s.cpu_percent > self.cpu_high {
            target = target.saturating_sub(1).max(self.min);
        } else if s.cpu_percent < self.cpu_low && target < self.max {
            target += 1;
        }
        if s.mem_percent > self.mem_high {
            target = target.saturating_sub(1).max(self.min);
        } else if s.mem_percent < self.mem_low {
            target = (target + 1).min(self.max);
        }
        let target = target.clamp(self.min, self.max);

        if target != inner.target {
            tracing::info!(
                cpu = s.cpu_percent,
                mem = s.mem_percent,
                old = inner.target,
                new = target,
                "governor adjusted concurrency target"
            );
            inner.target = target;
        }

        if s.rss_bytes > self.rss_ceiling {
            let due = inner
                .last_cleanup_at
                .map(|t| now.duration_since(t) >= self.check_interval)
                .unwrap_or(true);
            if due {
                inner.last_cleanup_at = Some(now);
                drop(inner);
                self.run_cleanup(s.rss_bytes);
                return self.inner.lock().unwrap().target;
            }
        }

        target
    }

    fn run_cleanup(&self, rss: u64) {
        tracing::warn!(
            rss_mb = rss / (1024 * 1024),
            ceiling_mb = self.rss_ceiling / (1024 * 1024),
            "memory pressure: running cleanup hooks"
        );
        for hook in self.cleanup_hooks.lock().unwrap().iter() {
            hook();
        }
    }

    /// Pre-download gate: free disk must cover the declared size plus the
    /// configured reserve.
    pub fn can_start(&self, declared_size: u64) -> bool {
        let free = {
            let mut inner = self.inner.lock().unwrap();
            inner.sampler.free_disk_bytes(&self.library_root)
        };
        free >= declared_size.saturating_add(self.disk_reserve)
    }

    /// Recent samples, oldest first (for the `performance` report).
    pub fn history(&self) -> Vec<ResourceSample> {
        self.inner.lock().unwrap().history.iter().copied().collect()
    }
}
