//! At-most-one in-flight transfer per remote file identifier.
//!
//! A duplicate submission fails to claim and is dropped at dispatch; the
//! claim is released by RAII when the transfer task finishes, whatever the
//! outcome.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Default)]
pub struct InFlightSet {
    inner: Mutex<HashSet<i64>>,
}

impl InFlightSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim an identifier. Returns None if a transfer for it is already
    /// in flight.
    pub fn try_claim(self: &Arc<Self>, remote_file_id: i64) -> Option<InFlightClaim> {
        let mut set = self.inner.lock().unwrap();
        if set.insert(remote_file_id) {
            Some(InFlightClaim {
                set: Arc::clone(self),
                remote_file_id,
            })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the identifier on drop.
pub struct InFlightClaim {
    set: Arc<InFlightSet>,
    remote_file_id: i64,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.set.inner.lock().unwrap().remove(&self.remote_file_id);
    }
}
