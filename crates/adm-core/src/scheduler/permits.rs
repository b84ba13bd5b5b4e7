//! Variable-target permit gate.
//!
//! A single gate whose capacity is a plain variable the governor adjusts:
//! permit issuance compares `in_use` against the current target, so there
//! is no semaphore instance to swap and a holder's release is always
//! valid. Shrinking the target never disturbs in-flight holders; the gate
//! simply stops issuing until enough of them drain.

use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug)]
struct GateState {
    target: usize,
    in_use: usize,
}

#[derive(Debug)]
pub struct PermitGate {
    inner: Mutex<GateState>,
    notify: Notify,
}

impl PermitGate {
    pub fn new(target: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(GateState {
                target: target.max(1),
                in_use: 0,
            }),
            notify: Notify::new(),
        })
    }

    /// Wait until a permit is available under the current target.
    pub async fn acquire(self: &Arc<Self>) -> PermitGuard {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            // Register before checking so a target change between the
            // check and the await cannot be lost.
            notified.as_mut().enable();
            {
                let mut g = self.inner.lock().unwrap();
                if g.in_use < g.target {
                    g.in_use += 1;
                    return PermitGuard {
                        gate: Arc::clone(self),
                    };
                }
            }
            notified.await;
        }
    }

    /// Adjust the target; wakes waiters so a raised target takes effect
    /// immediately.
    pub fn set_target(&self, target: usize) {
        {
            let mut g = self.inner.lock().unwrap();
            g.target = target.max(1);
        }
        self.notify.notify_waiters();
    }

    fn release(&self) {
        {
            let mut g = self.inner.lock().unwrap();
            g.in_use = g.in_use.saturating_sub(1);
        }
        self.notify.notify_one();
    }

    pub fn in_use(&self) -> usize {
        self.inner.lock().unwrap().in_use
    }

    pub fn target(&self) -> usize {
        self.inner.lock().unwrap().target
    }
}

/// Releases its permit on drop.
pub struct PermitGuard {
    gate: Arc<PermitGate>,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        self.gate.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn issues_up_to_target() {
        let gate = PermitGate::new(2);
        let a = gate.acquire().await;
        let b = gate.acquire().await;
        assert_eq!(gate.in_use(), 2);
        drop(a);
        assert_eq!(gate.in_use(), 1);
        drop(b);
        assert_eq!(gate.in_use(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_past_target_until_release() {
        let gate = PermitGate::new(1);
        let held = gate.acquire().await;

        let g2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            let _p = g2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should get the freed permit")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn raising_target_wakes_waiters() {
        let gate = PermitGate::new(1);
        let _held = gate.acquire().await;

        let g2 = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            let _p = g2.acquire().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        gate.set_target(2);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("raised target should admit the waiter")
            .unwrap();
        assert_eq!(gate.in_use(), 2);
    }

    #[tokio::test]
    async fn shrinking_target_keeps_holders_valid() {
        let gate = PermitGate::new(3);
        let a = gate.acquire().await;
        let b = gate.acquire().await;
        let c = gate.acquire().await;

        gate.set_target(1);
        assert_eq!(gate.in_use(), 3); // holders unaffected

        // Releases against the shrunk gate are valid and drain below target.
        drop(a);
        drop(b);
        drop(c);
        assert_eq!(gate.in_use(), 0);

        // Only one permit is issued now.
        let _x = gate.acquire().await;
        assert_eq!(gate.in_use(), 1);
        assert_eq!(gate.target(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn in_use_never_exceeds_target_at_issue_time() {
        let gate = PermitGate::new(4);
        let mut joins = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let g = Arc::clone(&gate);
            joins.spawn(async move {
                let _p = g.acquire().await;
                assert!(g.in_use() <= 4);
                tokio::time::sleep(Duration::from_millis(5)).await;
            });
        }
        while joins.join_next().await.is_some() {}
        assert_eq!(gate.in_use(), 0);
    }
}
