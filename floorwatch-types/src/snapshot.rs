//! Fleet snapshot - a point-in-time view of every machine's resolved state.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

use crate::{
    CurrentStateRecord, HealthBand, SchemaVersion, StateFilter, StatusClass, TimestampMs,
};

/// Default age after which a machine counts as stale (30 minutes).
pub const DEFAULT_STALE_AFTER_MS: u64 = 30 * 60 * 1000;

/// A point-in-time copy of all current state records.
///
/// Snapshots exist for export and reporting. Point queries go through the
/// state store and never build one.
///
/// # Example
///
/// ```rust
/// use floorwatch_types::FleetSnapshot;
///
/// let snapshot = FleetSnapshot::with_timestamp(1703160000000);
/// assert!(snapshot.is_empty());
/// assert!(snapshot.version.is_compatible());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct FleetSnapshot {
    /// Schema version for forward compatibility.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub version: SchemaVersion,

    /// Unix timestamp in milliseconds when this snapshot was taken.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub timestamp_ms: TimestampMs,

    /// Records keyed by machine ID.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub machines: BTreeMap<String, CurrentStateRecord>,
}

impl FleetSnapshot {
    /// Create an empty snapshot with the current timestamp.
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        Self::with_timestamp(current_timestamp_ms())
    }

    /// Create an empty snapshot with a specific timestamp.
    pub fn with_timestamp(timestamp_ms: TimestampMs) -> Self {
        Self {
            version: SchemaVersion::current(),
            timestamp_ms,
            machines: BTreeMap::new(),
        }
    }

    /// Add or replace a record.
    pub fn insert(&mut self, record: CurrentStateRecord) {
        self.machines
            .insert(String::from(record.id().as_str()), record);
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn get(&self, machine_id: &str) -> Option<&CurrentStateRecord> {
        self.machines.get(machine_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CurrentStateRecord)> {
        self.machines.iter()
    }

    /// Records matching `filter`, evaluated at the snapshot's timestamp.
    pub fn filtered<'a>(&'a self, filter: &'a StateFilter) -> Vec<&'a CurrentStateRecord> {
        self.machines
            .values()
            .filter(|record| filter.matches(record, self.timestamp_ms))
            .collect()
    }

    /// Fleet KPIs over every machine in the snapshot.
    pub fn summary(&self, stale_after_ms: u64) -> FleetSummary {
        FleetSummary::from_records(self.machines.values(), self.timestamp_ms, stale_after_ms)
    }
}

#[cfg(feature = "std")]
impl Default for FleetSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Fleet-level KPIs: machine counts per status and health band.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct FleetSummary {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub total: usize,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub running: usize,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub idle: usize,
    #[cfg_attr(feature = "minicbor", n(3))]
    pub stopped: usize,
    #[cfg_attr(feature = "minicbor", n(4))]
    pub fault: usize,
    #[cfg_attr(feature = "minicbor", n(5))]
    pub under_maintenance: usize,
    #[cfg_attr(feature = "minicbor", n(6))]
    pub unknown: usize,
    /// Mean health score; `None` for an empty fleet.
    #[cfg_attr(feature = "minicbor", n(7))]
    pub average_health: Option<f64>,
    #[cfg_attr(feature = "minicbor", n(8))]
    pub nominal: usize,
    #[cfg_attr(feature = "minicbor", n(9))]
    pub degraded: usize,
    #[cfg_attr(feature = "minicbor", n(10))]
    pub critical: usize,
    /// Machines without an event for longer than the stale cutoff.
    #[cfg_attr(feature = "minicbor", n(11))]
    pub stale: usize,
    /// Open work orders across all machines.
    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(12))]
    pub open_work_orders: usize,
}

impl FleetSummary {
    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a CurrentStateRecord>,
        now_ms: TimestampMs,
        stale_after_ms: u64,
    ) -> Self {
        let mut summary = FleetSummary::default();
        let mut health_sum = 0.0;

        for record in records {
            summary.total += 1;
            health_sum += record.health.score;

            match record.status.class() {
                StatusClass::Running => summary.running += 1,
                StatusClass::Idle => summary.idle += 1,
                StatusClass::Stopped => summary.stopped += 1,
                StatusClass::Fault => summary.fault += 1,
                StatusClass::UnderMaintenance => summary.under_maintenance += 1,
                StatusClass::Unknown => summary.unknown += 1,
            }

            match record.health.band {
                HealthBand::Nominal => summary.nominal += 1,
                HealthBand::Degraded => summary.degraded += 1,
                HealthBand::Critical => summary.critical += 1,
            }

            if record.is_stale(now_ms, stale_after_ms) {
                summary.stale += 1;
            }
            summary.open_work_orders += record.open_work_orders.len();
        }

        if summary.total > 0 {
            summary.average_health = Some(health_sum / summary.total as f64);
        }
        summary
    }
}

/// Get current timestamp in milliseconds since Unix epoch.
#[cfg(feature = "std")]
pub fn current_timestamp_ms() -> TimestampMs {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::record;
    use crate::MachineStatus;

    fn fleet() -> FleetSnapshot {
        let mut snapshot = FleetSnapshot::with_timestamp(DEFAULT_STALE_AFTER_MS * 2);
        let mut running = record("1001", MachineStatus::Running, 90.0, 4);
        running.last_event_ms = DEFAULT_STALE_AFTER_MS * 2;
        snapshot.insert(running);
        snapshot.insert(record("1002", MachineStatus::fault("F12"), 20.0, 2));
        let mut maintenance = record("1003", MachineStatus::UnderMaintenance, 60.0, 9);
        maintenance.open_work_orders = alloc::vec!["WO-7".into(), "WO-9".into()];
        snapshot.insert(maintenance);
        snapshot
    }

    #[test]
    fn summary_counts_statuses_and_bands() {
        let summary = fleet().summary(DEFAULT_STALE_AFTER_MS);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.running, 1);
        assert_eq!(summary.fault, 1);
        assert_eq!(summary.under_maintenance, 1);
        assert_eq!(summary.nominal, 1);
        assert_eq!(summary.degraded, 1);
        assert_eq!(summary.critical, 1);
        // 1002 and 1003 last reported at t=0.
        assert_eq!(summary.stale, 2);
        assert_eq!(summary.open_work_orders, 2);
        let avg = summary.average_health.unwrap();
        assert!((avg - 170.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_summary_has_no_average() {
        let summary = FleetSnapshot::with_timestamp(0).summary(DEFAULT_STALE_AFTER_MS);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.average_health, None);
    }

    #[test]
    fn filtered_uses_snapshot_time() {
        let snapshot = fleet();
        let filter = StateFilter::all().stale_only(DEFAULT_STALE_AFTER_MS);
        let ids: Vec<&str> = snapshot.filtered(&filter).iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, ["1002", "1003"]);
    }

    #[test]
    fn insert_replaces_by_machine_id() {
        let mut snapshot = fleet();
        snapshot.insert(record("1001", MachineStatus::Idle, 85.0, 5));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get("1001").unwrap().version, 5);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let snapshot = fleet();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: FleetSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }

    #[cfg(feature = "minicbor")]
    #[test]
    fn test_minicbor_roundtrip() {
        let snapshot = fleet();
        let bytes = minicbor::to_vec(&snapshot).unwrap();
        let parsed: FleetSnapshot = minicbor::decode(&bytes).unwrap();
        assert_eq!(snapshot, parsed);
    }
}
