//! Ingestion counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Lock-free counters shared by every ingestion path.
#[derive(Debug, Default)]
pub struct IngestStats {
    pub(crate) received: AtomicU64,
    pub(crate) accepted: AtomicU64,
    pub(crate) malformed: AtomicU64,
    pub(crate) stale: AtomicU64,
    pub(crate) duplicates: AtomicU64,
    pub(crate) committed: AtomicU64,
    pub(crate) contention_timeouts: AtomicU64,
    pub(crate) refresh_commits: AtomicU64,
}

impl IngestStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> IngestCounters {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        IngestCounters {
            received: load(&self.received),
            accepted: load(&self.accepted),
            malformed: load(&self.malformed),
            stale: load(&self.stale),
            duplicates: load(&self.duplicates),
            committed: load(&self.committed),
            contention_timeouts: load(&self.contention_timeouts),
            refresh_commits: load(&self.refresh_commits),
        }
    }
}

/// Serializable view of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounters {
    /// Raw events handed to the engine.
    pub received: u64,
    /// Events that changed per-machine state.
    pub accepted: u64,
    pub malformed: u64,
    /// Older than retained state or outside the health window.
    pub stale: u64,
    pub duplicates: u64,
    /// Records written by ingestion.
    pub committed: u64,
    pub contention_timeouts: u64,
    /// Records written by the periodic refresh sweep.
    pub refresh_commits: u64,
}

impl IngestCounters {
    /// Events that reached a final outcome.
    pub fn settled(&self) -> u64 {
        self.accepted + self.malformed + self.stale + self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = IngestStats::default();
        IngestStats::incr(&stats.received);
        IngestStats::incr(&stats.received);
        IngestStats::incr(&stats.malformed);
        IngestStats::incr(&stats.accepted);

        let counters = stats.snapshot();
        assert_eq!(counters.received, 2);
        assert_eq!(counters.malformed, 1);
        assert_eq!(counters.settled(), 2);
    }

    #[test]
    fn concurrent_increments_are_thread_safe() {
        let stats = Arc::new(IngestStats::default());
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..100 {
                        IngestStats::incr(&stats.received);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().received, 1000);
    }

    #[test]
    fn counters_serialize_as_flat_json() {
        let counters = IngestCounters {
            received: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(counters).unwrap();
        assert_eq!(json["received"], 3);
        assert_eq!(json["refresh_commits"], 0);
    }
}
