//! Per-machine processing: dedup, resolution, health, work orders, commit.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use floorwatch_types::{
    Machine, MachineId, MachineStatus, Payload, RawEvent, SourceKind, TelemetryEvent,
    TimestampMs,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::config::EngineConfig;
use crate::dedup::DedupWindow;
use crate::error::IngestError;
use crate::health::{HealthCalculator, HealthWindow, Observation};
use crate::normalizer::Normalizer;
use crate::resolver::{Offer, Resolver, SignalEntry, SignalTable};
use crate::stats::IngestStats;
use crate::store::{StateStore, StateUpdate};
use crate::work_orders::WorkOrders;

/// How an accepted raw event ended.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The machine's record was written with this version.
    Committed { version: u64, status: MachineStatus },
    /// Older than the retained signal for its kind, so status is
    /// unchanged. Health and work orders may still have taken it.
    Stale,
    /// Already applied under the same dedup key.
    Duplicate,
}

/// What was last written to the store for a machine.
#[derive(Debug, Clone, PartialEq)]
struct Committed {
    status: MachineStatus,
    score: f64,
}

#[derive(Debug)]
struct MachineState {
    machine: Machine,
    signals: SignalTable,
    health: HealthWindow,
    dedup: DedupWindow,
    work_orders: WorkOrders,
    last_event_ms: TimestampMs,
    committed: Option<Committed>,
    /// Applied changes not yet written because the store timed out.
    uncommitted: bool,
}

type Shard = RwLock<HashMap<MachineId, Arc<Mutex<MachineState>>>>;

/// Glues the normalizer, resolver and health calculator to the store.
///
/// Each machine's state sits behind its own mutex, so events for different
/// machines proceed in parallel while events for one machine are applied
/// one at a time.
#[derive(Debug)]
pub struct Pipeline {
    normalizer: Normalizer,
    resolver: Resolver,
    health: HealthCalculator,
    dedup_retention_ms: u64,
    dedup_capacity: usize,
    machines: Vec<Shard>,
    hasher: RandomState,
    store: Arc<StateStore>,
    stats: Arc<IngestStats>,
}

impl Pipeline {
    pub fn new(config: &EngineConfig, store: Arc<StateStore>, stats: Arc<IngestStats>) -> Self {
        Self {
            normalizer: Normalizer::new(config.precedence.clone()),
            resolver: Resolver::new(config.precedence.clone(), config.staleness.clone()),
            health: HealthCalculator::new(config.health.clone()),
            // Keys live as long as their event can still count toward health.
            dedup_retention_ms: config.health.window_ms(),
            dedup_capacity: config.pipeline.dedup_capacity,
            machines: (0..config.store.shards.max(1))
                .map(|_| RwLock::new(HashMap::new()))
                .collect(),
            hasher: RandomState::new(),
            store,
            stats,
        }
    }

    fn shard(&self, id: &MachineId) -> &Shard {
        let index = self.hasher.hash_one(id) as usize % self.machines.len();
        &self.machines[index]
    }

    fn get_or_register(&self, event: &TelemetryEvent, now_ms: TimestampMs) -> Arc<Mutex<MachineState>> {
        // Fast path: check if it exists
        {
            let shard = self.shard(&event.machine_id).read();
            if let Some(state) = shard.get(&event.machine_id) {
                return Arc::clone(state);
            }
        }

        // Slow path: first event for this machine fixes its metadata
        let mut shard = self.shard(&event.machine_id).write();
        Arc::clone(shard.entry(event.machine_id.clone()).or_insert_with(|| {
            debug!(machine = %event.machine_id, "registering machine");
            Arc::new(Mutex::new(MachineState {
                machine: Machine::new(event.machine_id.clone(), event.metadata.clone(), now_ms),
                signals: SignalTable::new(),
                health: self.health.window(),
                dedup: DedupWindow::new(self.dedup_retention_ms, self.dedup_capacity),
                work_orders: WorkOrders::new(),
                last_event_ms: 0,
                committed: None,
                uncommitted: false,
            }))
        }))
    }

    /// Normalize and apply one raw event, committing the machine's new state.
    pub fn process(&self, raw: RawEvent, now_ms: TimestampMs) -> Result<IngestOutcome, IngestError> {
        IngestStats::incr(&self.stats.received);

        let event = match self.normalizer.normalize(raw, now_ms) {
            Ok(event) => event,
            Err(err) => {
                IngestStats::incr(&self.stats.malformed);
                warn!(error = %err, "dropping malformed event");
                return Err(err.into());
            }
        };

        let state = self.get_or_register(&event, now_ms);
        let mut state = state.lock();

        if state.dedup.contains(&event.dedup_key) {
            return self.duplicate(&mut state, &event, now_ms);
        }

        let (resolved, side_effects) = match &event.payload {
            Payload::Signal(signal) => {
                let entry = SignalEntry {
                    signal: signal.clone(),
                    timestamp_ms: event.timestamp_ms,
                    dedup_key: event.dedup_key.clone(),
                    reference: event.reference.clone(),
                };
                let offer = state.signals.offer(event.kind, entry);
                if offer == Offer::Duplicate {
                    return self.duplicate(&mut state, &event, now_ms);
                }
                let orders_changed = event.kind == SourceKind::MaintenanceFlag
                    && state
                        .work_orders
                        .apply(signal, event.reference.as_deref(), event.timestamp_ms);
                // Health counts every in-window event, stale for the resolver or not.
                let observed =
                    self.health.observe(&mut state.health, &event, now_ms) == Observation::Recorded;
                (offer == Offer::Applied, observed || orders_changed)
            }
            Payload::Reading(_) => {
                let observed =
                    self.health.observe(&mut state.health, &event, now_ms) == Observation::Recorded;
                (observed, false)
            }
        };

        if !(resolved || side_effects) {
            IngestStats::incr(&self.stats.stale);
            debug!(
                machine = %event.machine_id,
                kind = %event.kind,
                timestamp_ms = event.timestamp_ms,
                "ignoring stale event"
            );
            return Ok(IngestOutcome::Stale);
        }

        state.dedup.insert(&event.dedup_key, event.timestamp_ms, now_ms);
        state.last_event_ms = state.last_event_ms.max(event.timestamp_ms);

        if !resolved {
            IngestStats::incr(&self.stats.stale);
            debug!(
                machine = %event.machine_id,
                kind = %event.kind,
                timestamp_ms = event.timestamp_ms,
                "stale signal; recording health and work orders only"
            );
            self.commit(&mut state, now_ms)?;
            return Ok(IngestOutcome::Stale);
        }

        IngestStats::incr(&self.stats.accepted);
        self.commit(&mut state, now_ms)
    }

    fn duplicate(
        &self,
        state: &mut MachineState,
        event: &TelemetryEvent,
        now_ms: TimestampMs,
    ) -> Result<IngestOutcome, IngestError> {
        IngestStats::incr(&self.stats.duplicates);
        debug!(machine = %event.machine_id, key = %event.dedup_key, "duplicate event");
        if state.uncommitted {
            // A retry after a contention timeout: finish the commit.
            return self.commit(state, now_ms);
        }
        Ok(IngestOutcome::Duplicate)
    }

    fn update(&self, state: &MachineState, now_ms: TimestampMs) -> StateUpdate {
        let resolution = self.resolver.resolve(&state.signals, now_ms);
        StateUpdate {
            machine: state.machine.clone(),
            status: resolution.status,
            source: resolution.source,
            health: self.health.score(&state.health, &state.machine.id, now_ms),
            signals: self.resolver.snapshots(&state.signals, now_ms),
            signal_generation: resolution.generation,
            last_event_ms: state.last_event_ms,
            resolved_at_ms: now_ms,
            open_work_orders: state.work_orders.open(),
        }
    }

    fn write(&self, state: &mut MachineState, update: StateUpdate) -> Result<u64, IngestError> {
        let committed = Committed {
            status: update.status.clone(),
            score: update.health.score,
        };
        match self.store.upsert(update) {
            Ok(version) => {
                state.committed = Some(committed);
                state.uncommitted = false;
                Ok(version)
            }
            Err(err) => {
                state.uncommitted = true;
                IngestStats::incr(&self.stats.contention_timeouts);
                Err(err.into())
            }
        }
    }

    fn commit(&self, state: &mut MachineState, now_ms: TimestampMs) -> Result<IngestOutcome, IngestError> {
        let update = self.update(state, now_ms);
        let status = update.status.clone();
        let version = self.write(state, update)?;
        IngestStats::incr(&self.stats.committed);
        trace!(machine = %state.machine.id, version, status = %status, "committed");
        Ok(IngestOutcome::Committed { version, status })
    }

    /// Re-resolve every machine at `now`, writing those whose status or
    /// score moved since their last commit. Returns the number written.
    pub fn refresh(&self, now_ms: TimestampMs) -> usize {
        let machines: Vec<_> = self
            .machines
            .iter()
            .flat_map(|shard| shard.read().values().cloned().collect::<Vec<_>>())
            .collect();

        let mut written = 0;
        for machine in machines {
            let mut state = machine.lock();
            let update = self.update(&state, now_ms);
            let changed = match &state.committed {
                Some(last) => {
                    last.status != update.status || (last.score - update.health.score).abs() > 1e-9
                }
                None => true,
            };
            if !(changed || state.uncommitted) {
                continue;
            }
            match self.write(&mut state, update) {
                Ok(version) => {
                    written += 1;
                    IngestStats::incr(&self.stats.refresh_commits);
                    trace!(machine = %state.machine.id, version, "refresh committed");
                }
                Err(err) => {
                    debug!(machine = %state.machine.id, error = %err, "refresh deferred");
                }
            }
        }
        written
    }

    /// Machines seen so far.
    pub fn machine_count(&self) -> usize {
        self.machines.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<IngestStats> {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MalformedEventError, StoreError};
    use crate::subscription::SubscriptionHub;
    use floorwatch_types::{MachineMetadata, RawPayload, SourceKind};

    const MIN: u64 = 60_000;

    fn pipeline() -> Pipeline {
        let config = EngineConfig::default();
        let hub = Arc::new(SubscriptionHub::new(config.subscriptions.buffer));
        let store = Arc::new(StateStore::new(
            config.store.shards,
            config.store.contention_timeout,
            hub,
        ));
        Pipeline::new(&config, store, Arc::new(IngestStats::default()))
    }

    fn raw(kind: &str, ts: u64, payload: RawPayload) -> RawEvent {
        RawEvent::new("1001", kind, ts, payload)
    }

    fn record(p: &Pipeline) -> Arc<floorwatch_types::CurrentStateRecord> {
        p.store().get(&MachineId::from("1001")).unwrap()
    }

    #[test]
    fn fault_then_operator_resolves_to_fault_until_it_expires() {
        let p = pipeline();
        p.process(raw("sensor", 1, RawPayload::status("NOMINAL")), 3).unwrap();
        p.process(raw("fault_code", 2, RawPayload::code("F12")), 3).unwrap();
        let outcome = p
            .process(raw("operator_override", 3, RawPayload::status("RUNNING")), 3)
            .unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Committed {
                version: 3,
                status: MachineStatus::fault("F12")
            }
        );

        let rec = record(&p);
        assert_eq!(rec.status.to_string(), "F12");
        assert_eq!(rec.source, Some(SourceKind::FaultCode));
        assert_eq!(rec.signals.len(), 3);

        // Past the 30 minute fault window the operator override shows through.
        assert_eq!(p.refresh(2 + 30 * MIN + 1), 1);
        let rec = record(&p);
        assert_eq!(rec.status, MachineStatus::Running);
        assert_eq!(rec.source, Some(SourceKind::OperatorOverride));
        assert!(rec.signal(SourceKind::FaultCode).unwrap().expired);
        assert_eq!(rec.version, 4);
    }

    #[test]
    fn stale_event_never_regresses_status() {
        let p = pipeline();
        p.process(raw("fault_code", 10, RawPayload::code("F1")), 10).unwrap();
        let before = record(&p);

        let outcome = p.process(raw("fault_code", 5, RawPayload::code("CLEAR")), 10).unwrap();
        assert_eq!(outcome, IngestOutcome::Stale);
        let after = record(&p);
        assert_eq!(after.status, before.status);
        assert_eq!(after.signal_generation, before.signal_generation);
        assert_eq!(after.signal(SourceKind::FaultCode).unwrap().timestamp_ms, 10);
        // Still inside the health window, so it counts there.
        assert_eq!(after.health.window.events, 2);
        assert_eq!(p.stats().snapshot().stale, 1);

        // Stale for the resolver and outside the window: nothing is written.
        let outcome = p.process(raw("fault_code", 0, RawPayload::code("F9")), 60 * MIN).unwrap();
        assert_eq!(outcome, IngestOutcome::Stale);
        assert_eq!(record(&p).version, after.version);
    }

    #[test]
    fn health_does_not_depend_on_fault_arrival_order() {
        let readings = [10.0, 12.0, 11.0, 40.0];
        let run = |faults: &[u64]| {
            let p = pipeline();
            for (i, value) in readings.iter().enumerate() {
                p.process(raw("sensor", 1 + i as u64, RawPayload::reading(*value)), 10).unwrap();
            }
            for ts in faults {
                p.process(raw("fault_code", *ts, RawPayload::code(&format!("F{ts}"))), 10).unwrap();
            }
            let rec = record(&p);
            (rec.health.window.faults, rec.health.score, rec.status.clone())
        };

        let forward = run(&[1, 2, 3]);
        let reversed = run(&[3, 2, 1]);
        assert_eq!(forward.0, 3);
        assert_eq!(forward.0, reversed.0);
        assert!((forward.1 - reversed.1).abs() < 1e-9);
        assert_eq!(forward.2, MachineStatus::fault("F3"));
        assert_eq!(forward.2, reversed.2);
    }

    #[test]
    fn duplicates_are_not_counted_twice() {
        let p = pipeline();
        let event = raw("fault_code", 1, RawPayload::code("F1")).with_dedup_key("evt-1");
        p.process(event.clone(), 1).unwrap();
        assert_eq!(p.process(event, 1).unwrap(), IngestOutcome::Duplicate);

        let rec = record(&p);
        assert_eq!(rec.health.window.events, 1);
        assert_eq!(rec.health.window.faults, 1);
        assert_eq!(rec.version, 1);
        assert_eq!(p.stats().snapshot().duplicates, 1);
    }

    #[test]
    fn replay_after_dedup_eviction_is_still_a_duplicate() {
        let mut config = EngineConfig::default();
        config.pipeline.dedup_capacity = 2;
        let hub = Arc::new(SubscriptionHub::new(8));
        let store = Arc::new(StateStore::new(1, config.store.contention_timeout, hub));
        let p = Pipeline::new(&config, store, Arc::new(IngestStats::default()));

        let fault = raw("fault_code", 1, RawPayload::code("F1")).with_dedup_key("evt-1");
        p.process(fault.clone(), 1).unwrap();
        p.process(raw("sensor", 2, RawPayload::reading(5.0)), 2).unwrap();
        p.process(raw("sensor", 3, RawPayload::reading(6.0)), 3).unwrap();
        let before = record(&p);

        // "evt-1" has been pushed out of the two-key window.
        assert_eq!(p.process(fault, 3).unwrap(), IngestOutcome::Duplicate);
        let rec = record(&p);
        assert_eq!(rec.health.window.faults, 1);
        assert_eq!(rec.health.window.events, 3);
        assert_eq!(rec.signal_generation, 1);
        assert_eq!(rec.version, before.version);
        assert_eq!(p.stats().snapshot().duplicates, 1);
    }

    #[test]
    fn readings_are_remembered_for_the_health_window() {
        let p = pipeline();
        let reading = raw("sensor", 1, RawPayload::reading(5.0)).with_dedup_key("r-1");
        p.process(reading.clone(), 1).unwrap();
        for ts in 2..600u64 {
            p.process(raw("sensor", ts * 1_000, RawPayload::reading(5.0)), ts * 1_000).unwrap();
        }
        assert_eq!(p.process(reading, 600_000).unwrap(), IngestOutcome::Duplicate);
        assert_eq!(record(&p).health.window.readings, 599);
    }

    #[test]
    fn maintenance_flags_track_open_work_orders() {
        let p = pipeline();
        let flag = |ts: u64, word: &str, reference: Option<&str>| {
            let event = raw("maintenance_flag", ts, RawPayload::status(word));
            match reference {
                Some(reference) => event.with_reference(reference),
                None => event,
            }
        };

        p.process(flag(1, "ON", Some("WO-1")), 5).unwrap();
        p.process(flag(2, "ON", Some("WO-2")), 5).unwrap();
        let rec = record(&p);
        assert_eq!(rec.status, MachineStatus::UnderMaintenance);
        assert_eq!(rec.open_work_orders, ["WO-1", "WO-2"]);

        // Older than the retained flag: status stays, but WO-1 is closed.
        let outcome = p.process(flag(1, "OFF", Some("WO-1")), 5).unwrap();
        assert_eq!(outcome, IngestOutcome::Stale);
        let rec = record(&p);
        assert_eq!(rec.status, MachineStatus::UnderMaintenance);
        assert_eq!(rec.open_work_orders, ["WO-2"]);

        p.process(flag(3, "OFF", None), 5).unwrap();
        let rec = record(&p);
        assert_eq!(rec.status, MachineStatus::Unknown);
        assert!(rec.open_work_orders.is_empty());
    }

    #[test]
    fn readings_only_touch_health() {
        let p = pipeline();
        p.process(raw("sensor", 1, RawPayload::status("IDLE")), 1).unwrap();
        let outcome = p.process(raw("sensor", 2, RawPayload::reading(100.0)), 2).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Committed {
                version: 2,
                status: MachineStatus::Idle
            }
        );
        let rec = record(&p);
        assert_eq!(rec.health.window.readings, 1);
        assert_eq!(rec.signal_generation, 1);
        assert!(rec.health.score < 100.0);
    }

    #[test]
    fn reading_outside_window_is_stale() {
        let p = pipeline();
        let outcome = p.process(raw("sensor", 0, RawPayload::reading(50.0)), 60 * MIN).unwrap();
        assert_eq!(outcome, IngestOutcome::Stale);
        assert_eq!(p.machine_count(), 1);
        assert!(p.store().is_empty());
    }

    #[test]
    fn malformed_events_are_counted_and_dropped() {
        let p = pipeline();
        let err = p.process(raw("sensor", 1, RawPayload::code("F1")), 1).unwrap_err();
        assert!(matches!(
            err,
            IngestError::Malformed(MalformedEventError::PayloadShape { .. })
        ));
        let counters = p.stats().snapshot();
        assert_eq!(counters.received, 1);
        assert_eq!(counters.malformed, 1);
        assert_eq!(p.machine_count(), 0);
    }

    #[test]
    fn metadata_comes_from_first_event() {
        let p = pipeline();
        let first = MachineMetadata {
            plant: Some("Plant A".into()),
            ..Default::default()
        };
        let second = MachineMetadata {
            plant: Some("Plant B".into()),
            ..Default::default()
        };
        p.process(raw("sensor", 1, RawPayload::status("ON")).with_metadata(first), 1).unwrap();
        p.process(raw("sensor", 2, RawPayload::status("OFF")).with_metadata(second), 2).unwrap();
        let rec = record(&p);
        assert_eq!(rec.machine.metadata.plant.as_deref(), Some("Plant A"));
        assert_eq!(rec.machine.registered_at_ms, 1);
    }

    #[test]
    fn refresh_skips_unchanged_machines() {
        let p = pipeline();
        p.process(raw("operator_override", 0, RawPayload::status("RUNNING")), 0).unwrap();
        assert_eq!(p.refresh(1), 0);
        assert_eq!(record(&p).version, 1);
    }

    #[test]
    fn versions_strictly_increase() {
        let p = pipeline();
        let mut last = 0;
        for ts in 1..=20u64 {
            let word = if ts % 2 == 0 { "RUNNING" } else { "IDLE" };
            if let IngestOutcome::Committed { version, .. } =
                p.process(raw("sensor", ts, RawPayload::status(word)), ts).unwrap()
            {
                assert!(version > last);
                last = version;
            }
        }
        assert_eq!(last, 20);
    }

    #[test]
    fn retry_after_contention_finishes_commit() {
        let config = EngineConfig::default();
        let hub = Arc::new(SubscriptionHub::new(8));
        let store = Arc::new(StateStore::new(1, std::time::Duration::from_millis(5), hub));
        let p = Pipeline::new(&config, Arc::clone(&store), Arc::new(IngestStats::default()));

        p.process(raw("sensor", 1, RawPayload::status("RUNNING")), 1).unwrap();
        let event = raw("fault_code", 2, RawPayload::code("F7"));

        let err = store.hold_writer(&MachineId::from("1001"), || {
            p.process(event.clone(), 2).unwrap_err()
        });
        assert_eq!(
            err,
            IngestError::Store(StoreError::ContentionTimeout(MachineId::from("1001")))
        );
        assert!(err.is_retryable());

        let outcome = p.process(event, 2).unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Committed {
                version: 2,
                status: MachineStatus::fault("F7")
            }
        );
        assert_eq!(p.stats().snapshot().contention_timeouts, 1);
    }
}
