//! Token-bucket rate limiter for remote calls.
//!
//! Downloads are charged a weight proportional to file size so large
//! transfers leave bandwidth for peers. Flow-control violations halve the
//! rate (multiplicative decrease); quiet periods grow it back slowly.
//! Acquires are served in FIFO order with no preemption; an acquire
//! aborted by the caller has taken no tokens.
//!
//! Time is measured with `tokio::time::Instant` so tests under a paused
//! clock are deterministic.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Floor the rate can decay to under repeated violations.
const RATE_FLOOR: f64 = 0.1;
/// Ceiling for additive growth when the remote is quiet.
const RATE_CEILING: f64 = 2.0;
/// Sliding window consulted for grant pressure and violation recency.
const WINDOW: Duration = Duration::from_secs(60);
/// Grants in the window beyond which acquires are surcharged.
const PRESSURE_GRANTS: usize = 30;
const PRESSURE_FACTOR: f64 = 1.5;

struct LimiterState {
    rate: f64,
    tokens: f64,
    last_refill: Instant,
    grants: VecDeque<Instant>,
    last_violation: Option<Instant>,
}

impl LimiterState {
    fn refill(&mut self, now: Instant, burst: f64) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(burst);
        self.last_refill = now;
    }

    fn prune_grants(&mut self, now: Instant) {
        while let Some(front) = self.grants.front() {
            if now.duration_since(*front) > WINDOW {
                self.grants.pop_front();
            } else {
                break;
            }
        }
    }
}

pub struct RateLimiter {
    burst: f64,
    state: Mutex<LimiterState>,
    /// FIFO queue of acquirers; tokio's mutex wakes waiters in order.
    gate: tokio::sync::Mutex<()>,
}

impl RateLimiter {
    pub fn new(rate_initial: f64, burst: f64) -> Self {
        let rate = rate_initial.max(RATE_FLOOR);
        let burst = burst.max(1.0);
        Self {
            burst,
            state: Mutex::new(LimiterState {
                rate,
                tokens: burst,
                last_refill: Instant::now(),
                grants: VecDeque::new(),
                last_violation: None,
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Weight charged for downloading a file of `size_bytes`.
    pub fn weight_for_size(size_bytes: u64) -> f64 {
        let size_mb = size_bytes as f64 / (1024.0 * 1024.0);
        (size_mb / 10.0).max(1.0)
    }

    /// Await tokens for one remote call, then deduct them and record the
    /// grant. FIFO across concurrent callers.
    pub async fn acquire(&self, weight: f64) {
        let _turn = self.gate.lock().await;
        loop {
            let wait = {
                let mut s = self.state.lock().unwrap();
                let now = Instant::now();
                s.refill(now, self.burst);
                s.prune_grants(now);

                let mut effective = weight;
                if s.grants.len() > PRESSURE_GRANTS {
                    effective *= PRESSURE_FACTOR;
                }
                // A weight above the bucket capacity could never be
                // satisfied; clamp so oversized files still dispatch.
                effective = effective.min(self.burst);

                if s.tokens >= effective {
                    s.tokens -= effective;
                    s.grants.push_back(now);
                    return;
                }
                Duration::from_secs_f64((effective - s.tokens) / s.rate)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// React to remote flow-control. A positive `flood_wait_seconds` halves
    /// the rate; zero grows it by 10% if no violation happened in the last
    /// window.
    pub fn adjust(&self, flood_wait_seconds: u64) {
        let mut s = self.state.lock().unwrap();
        let now = Instant::now();
        if flood_wait_seconds > 0 {
            s.rate = (s.rate * 0.5).max(RATE_FLOOR);
            s.last_violation = Some(now);
            tracing::warn!(
                rate = s.rate,
                wait = flood_wait_seconds,
                "rate limiter engaged after flow-control violation"
            );
        } else {
            let quiet = s
                .last_violation
                .map(|v| now.duration_since(v) > WINDOW)
                .unwrap_or(true);
            if quiet {
                s.rate = (s.rate * 1.1).min(RATE_CEILING);
            }
        }
    }

    /// Current token refill rate (tokens/second).
    pub fn current_rate(&self) -> f64 {
        self.state.lock().unwrap().rate
    }

    /// Grants recorded in the sliding window; used for diagnostics.
    pub fn recent_grants(&self) -> usize {
        let mut s = self.state.lock().unwrap();
        s.prune_grants(Instant::now());
        s.grants.len()
    }
}
