//! Memory of accepted dedup keys, kept for as long as their event can
//! still change the machine's health window.

use std::collections::{BTreeSet, HashMap};

use floorwatch_types::TimestampMs;
use tracing::debug;

/// Keys are held until their event time falls behind `now - retention`.
///
/// `capacity` is a hard ceiling for machines that flood the window; past it
/// the key with the oldest event time goes first.
#[derive(Debug, Clone)]
pub struct DedupWindow {
    keys: HashMap<String, TimestampMs>,
    by_time: BTreeSet<(TimestampMs, String)>,
    retention_ms: u64,
    capacity: usize,
}

impl DedupWindow {
    pub fn new(retention_ms: u64, capacity: usize) -> Self {
        Self {
            keys: HashMap::new(),
            by_time: BTreeSet::new(),
            retention_ms,
            capacity: capacity.max(1),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    /// Remember `key` for an event at `timestamp_ms`. Returns false if it
    /// was already known.
    pub fn insert(&mut self, key: &str, timestamp_ms: TimestampMs, now_ms: TimestampMs) -> bool {
        if self.keys.contains_key(key) {
            return false;
        }
        self.expire(now_ms);
        if self.keys.len() >= self.capacity {
            if let Some((ts, oldest)) = self.by_time.pop_first() {
                debug!(key = %oldest, timestamp_ms = ts, "dedup window full; forgetting oldest key");
                self.keys.remove(&oldest);
            }
        }
        self.keys.insert(key.to_string(), timestamp_ms);
        self.by_time.insert((timestamp_ms, key.to_string()));
        true
    }

    /// Forget keys whose event time is older than the retention at `now`.
    pub fn expire(&mut self, now_ms: TimestampMs) {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        while let Some((ts, _)) = self.by_time.first() {
            if *ts >= cutoff {
                break;
            }
            if let Some((_, key)) = self.by_time.pop_first() {
                self.keys.remove(&key);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
