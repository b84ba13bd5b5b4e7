//! Bounded LRU cache of completed remote file identifiers.
//!
//! A fast negative filter for discovery: presence means "already fetched,
//! skip". Not authoritative — the job store is. Seeded at startup from the
//! store's completed rows; inserts come from the transfer engine on
//! completion. Lookups and inserts never block on I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

struct CacheState {
    /// id -> recency tick.
    entries: HashMap<i64, u64>,
    /// recency tick -> id; the smallest tick is the least recently used.
    order: BTreeMap<u64, i64>,
    next_tick: u64,
}

/// Insertion-ordered identifier set with LRU eviction on insert.
pub struct IdCache {
    capacity: usize,
    state: Mutex<CacheState>,
}

impl IdCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
            }),
        }
    }

    /// Presence check. Does not update recency order.
    pub fn has(&self, id: i64) -> bool {
        self.state.lock().unwrap().entries.contains_key(&id)
    }

    /// Insert or promote `id` to most-recent; evict the least-recent entry
    /// when capacity is exceeded.
    pub fn insert(&self, id: i64) {
        let mut s = self.state.lock().unwrap();
        let tick = s.next_tick;
        s.next_tick += 1;
        if let Some(old) = s.entries.insert(id, tick) {
            s.order.remove(&old);
        }
        s.order.insert(tick, id);
        if s.entries.len() > self.capacity {
            if let Some((_, oldest_id)) = s.order.pop_first() {
                s.entries.remove(&oldest_id);
            }
        }
    }

    /// Seed from the job store's completed identifiers.
    pub fn seed<I: IntoIterator<Item = i64>>(&self, ids: I) {
        for id in ids {
            self.insert(id);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
