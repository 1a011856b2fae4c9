//! Sharded latest-value store of current state records.
//!
//! Readers take a shard read lock and clone an `Arc`, so point reads never
//! wait on a writer that is building a record. Writers for the same machine
//! are serialized by a per-slot mutex; the record swap and subscriber
//! notification happen inside that critical section.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;
use std::time::Duration;

use floorwatch_types::{
    CurrentStateRecord, FleetSnapshot, HealthRecord, Machine, MachineId, MachineStatus,
    SignalSnapshot, SourceKind, StateFilter, TimestampMs,
};
use parking_lot::{Mutex, RwLock};
use tracing::warn;

use crate::error::{QueryError, StoreError};
use crate::subscription::{Subscription, SubscriptionHub};

/// Everything a record carries except its version, which the store assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct StateUpdate {
    pub machine: Machine,
    pub status: MachineStatus,
    pub source: Option<SourceKind>,
    pub health: HealthRecord,
    pub signals: Vec<SignalSnapshot>,
    pub signal_generation: u64,
    pub last_event_ms: TimestampMs,
    pub resolved_at_ms: TimestampMs,
    pub open_work_orders: Vec<String>,
}

impl StateUpdate {
    fn into_record(self, version: u64) -> CurrentStateRecord {
        CurrentStateRecord {
            machine: self.machine,
            status: self.status,
            source: self.source,
            health: self.health,
            signals: self.signals,
            signal_generation: self.signal_generation,
            last_event_ms: self.last_event_ms,
            resolved_at_ms: self.resolved_at_ms,
            version,
            open_work_orders: self.open_work_orders,
        }
    }
}

#[derive(Debug)]
struct Slot {
    writer: Mutex<()>,
    current: RwLock<Arc<CurrentStateRecord>>,
}

type Shard = RwLock<HashMap<MachineId, Arc<Slot>>>;

/// Current state of every known machine.
#[derive(Debug)]
pub struct StateStore {
    shards: Vec<Shard>,
    hasher: RandomState,
    contention_timeout: Duration,
    hub: Arc<SubscriptionHub>,
}

impl StateStore {
    pub fn new(shards: usize, contention_timeout: Duration, hub: Arc<SubscriptionHub>) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
            contention_timeout,
            hub,
        }
    }

    fn shard(&self, id: &MachineId) -> &Shard {
        let index = self.hasher.hash_one(id) as usize % self.shards.len();
        &self.shards[index]
    }

    fn slot(&self, id: &MachineId) -> Option<Arc<Slot>> {
        self.shard(id).read().get(id).cloned()
    }

    /// Write a new record for the machine and return its version.
    ///
    /// The first write for a machine gets version 1; every later write gets
    /// the previous version plus one.
    pub fn upsert(&self, update: StateUpdate) -> Result<u64, StoreError> {
        let id = update.machine.id.clone();

        // Fast path: the machine is already known.
        let slot = match self.slot(&id) {
            Some(slot) => slot,
            None => {
                let mut shard = self.shard(&id).write();
                match shard.get(&id) {
                    Some(slot) => Arc::clone(slot),
                    None => {
                        let record = Arc::new(update.into_record(1));
                        self.hub.publish(&record);
                        shard.insert(
                            id,
                            Arc::new(Slot {
                                writer: Mutex::new(()),
                                current: RwLock::new(record),
                            }),
                        );
                        return Ok(1);
                    }
                }
            }
        };

        let Some(_guard) = slot.writer.try_lock_for(self.contention_timeout) else {
            warn!(machine = %id, timeout = ?self.contention_timeout, "state store contention timeout");
            return Err(StoreError::ContentionTimeout(id));
        };

        let version = slot.current.read().version + 1;
        let record = Arc::new(update.into_record(version));
        *slot.current.write() = Arc::clone(&record);
        self.hub.publish(&record);
        Ok(version)
    }

    /// Latest record for a machine.
    pub fn get(&self, id: &MachineId) -> Result<Arc<CurrentStateRecord>, QueryError> {
        self.slot(id)
            .map(|slot| {
                let current = slot.current.read();
                Arc::clone(&current)
            })
            .ok_or_else(|| QueryError::UnknownMachine(id.clone()))
    }

    /// Every current record, in no particular order.
    pub fn records(&self) -> Vec<Arc<CurrentStateRecord>> {
        self.shards
            .iter()
            .flat_map(|shard| {
                shard
                    .read()
                    .values()
                    .map(|slot| Arc::clone(&slot.current.read()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Copy of every record for export.
    pub fn snapshot(&self, now_ms: TimestampMs) -> FleetSnapshot {
        let mut snapshot = FleetSnapshot::with_timestamp(now_ms);
        for record in self.records() {
            snapshot.insert(CurrentStateRecord::clone(&record));
        }
        snapshot
    }

    /// Subscribe to matching updates, starting with the current record of
    /// every machine that matches now.
    pub fn subscribe(&self, filter: StateFilter, now_ms: TimestampMs) -> Subscription {
        let subscription = self.hub.register(filter);
        for record in self.records() {
            if subscription.queue().matches(&record, now_ms) {
                subscription.queue().offer(record);
            }
        }
        subscription
    }

    /// Number of known machines.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hub(&self) -> &Arc<SubscriptionHub> {
        &self.hub
    }

    /// Run `f` while holding the writer lock of a known machine.
    #[cfg(test)]
    pub(crate) fn hold_writer<R>(&self, id: &MachineId, f: impl FnOnce() -> R) -> R {
        let slot = self.slot(id).expect("machine is known");
        let _held = slot.writer.lock();
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorwatch_types::{HealthBand, MachineMetadata, WindowStats};
    use std::thread;

    fn store(shards: usize) -> StateStore {
        StateStore::new(shards, Duration::from_millis(20), Arc::new(SubscriptionHub::new(16)))
    }

    fn update(id: &str, status: MachineStatus, at: u64) -> StateUpdate {
        let machine_id = MachineId::from(id);
        StateUpdate {
            machine: Machine::new(machine_id.clone(), MachineMetadata::default(), 0),
            status,
            source: None,
            health: HealthRecord {
                machine_id,
                score: 100.0,
                band: HealthBand::Nominal,
                window: WindowStats::default(),
                updated_at_ms: at,
            },
            signals: Vec::new(),
            signal_generation: 0,
            last_event_ms: at,
            resolved_at_ms: at,
            open_work_orders: Vec::new(),
        }
    }

    #[test]
    fn versions_start_at_one_and_increase() {
        let store = store(4);
        assert_eq!(store.upsert(update("1001", MachineStatus::Running, 1)), Ok(1));
        assert_eq!(store.upsert(update("1001", MachineStatus::Idle, 2)), Ok(2));
        assert_eq!(store.upsert(update("1002", MachineStatus::Idle, 2)), Ok(1));

        let record = store.get(&MachineId::from("1001")).unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.status, MachineStatus::Idle);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn unknown_machine_is_an_error() {
        let store = store(1);
        assert_eq!(
            store.get(&MachineId::from("nope")),
            Err(QueryError::UnknownMachine(MachineId::from("nope")))
        );
        assert!(store.is_empty());
    }

    #[test]
    fn held_writer_times_out() {
        let store = store(1);
        store.upsert(update("1001", MachineStatus::Running, 1)).unwrap();

        let err = store.hold_writer(&MachineId::from("1001"), || {
            store.upsert(update("1001", MachineStatus::Idle, 2)).unwrap_err()
        });
        assert_eq!(err, StoreError::ContentionTimeout(MachineId::from("1001")));
        assert_eq!(store.get(&MachineId::from("1001")).unwrap().version, 1);
    }

    #[test]
    fn concurrent_writers_get_distinct_versions() {
        let store = Arc::new(store(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..50)
                        .map(|n| {
                            loop {
                                match store.upsert(update("hot", MachineStatus::Running, i * 100 + n)) {
                                    Ok(version) => break version,
                                    Err(err) => assert!(err.is_retryable()),
                                }
                            }
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut versions: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        versions.sort_unstable();
        assert_eq!(versions, (1..=400).collect::<Vec<u64>>());
    }

    #[test]
    fn subscribe_seeds_current_state() {
        let store = store(4);
        store.upsert(update("1", MachineStatus::Running, 1)).unwrap();
        store.upsert(update("1", MachineStatus::Idle, 2)).unwrap();
        store.upsert(update("2", MachineStatus::Running, 2)).unwrap();

        let mut sub = store.subscribe(StateFilter::all().machine("1"), 2);
        let seeded = sub.try_recv().unwrap();
        assert_eq!(seeded.version, 2);
        assert!(sub.try_recv().is_none());

        store.upsert(update("1", MachineStatus::Stopped, 3)).unwrap();
        store.upsert(update("2", MachineStatus::Stopped, 3)).unwrap();
        let next = sub.try_recv().unwrap();
        assert_eq!((next.id().as_str(), next.version), ("1", 3));
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn snapshot_holds_every_machine() {
        let store = store(3);
        for id in ["a", "b", "c", "d"] {
            store.upsert(update(id, MachineStatus::Running, 5)).unwrap();
        }
        let snapshot = store.snapshot(9);
        assert_eq!(snapshot.len(), 4);
        assert_eq!(snapshot.timestamp_ms, 9);
        assert_eq!(snapshot.get("c").unwrap().version, 1);
    }
}
