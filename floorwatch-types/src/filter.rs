//! Record filters shared by subscriptions and exports.

use alloc::collections::BTreeSet;
use alloc::string::String;

use crate::{CurrentStateRecord, MachineId, StatusClass, TimestampMs};

/// Selects a subset of machines.
///
/// Every populated criterion must match; empty sets place no restriction.
///
/// # Example
///
/// ```rust
/// use floorwatch_types::{StateFilter, StatusClass};
///
/// let filter = StateFilter::all()
///     .plant("Plant A")
///     .status(StatusClass::Fault)
///     .health_range(0.0, 50.0);
/// assert!(!filter.is_all());
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StateFilter {
    pub machines: BTreeSet<MachineId>,
    pub plants: BTreeSet<String>,
    pub lines: BTreeSet<String>,
    pub machine_types: BTreeSet<String>,
    pub statuses: BTreeSet<StatusClass>,
    pub min_health: Option<f64>,
    pub max_health: Option<f64>,
    /// Only machines with no event for longer than this many milliseconds.
    pub stale_after_ms: Option<u64>,
}

impl StateFilter {
    /// A filter matching every machine.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn machine(mut self, id: impl Into<MachineId>) -> Self {
        self.machines.insert(id.into());
        self
    }

    pub fn plant(mut self, plant: impl Into<String>) -> Self {
        self.plants.insert(plant.into());
        self
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.lines.insert(line.into());
        self
    }

    pub fn machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.machine_types.insert(machine_type.into());
        self
    }

    pub fn status(mut self, class: StatusClass) -> Self {
        self.statuses.insert(class);
        self
    }

    /// Inclusive health score range.
    pub fn health_range(mut self, min: f64, max: f64) -> Self {
        self.min_health = Some(min);
        self.max_health = Some(max);
        self
    }

    pub fn stale_only(mut self, stale_after_ms: u64) -> Self {
        self.stale_after_ms = Some(stale_after_ms);
        self
    }

    /// True if the filter places no restriction at all.
    pub fn is_all(&self) -> bool {
        *self == Self::default()
    }

    /// Check a record against the filter at time `now_ms`.
    pub fn matches(&self, record: &CurrentStateRecord, now_ms: TimestampMs) -> bool {
        let meta = &record.machine.metadata;
        contains_or_empty(&self.machines, Some(&record.machine.id))
            && contains_or_empty(&self.plants, meta.plant.as_ref())
            && contains_or_empty(&self.lines, meta.line.as_ref())
            && contains_or_empty(&self.machine_types, meta.machine_type.as_ref())
            && contains_or_empty(&self.statuses, Some(&record.status.class()))
            && self.min_health.map_or(true, |min| record.health.score >= min)
            && self.max_health.map_or(true, |max| record.health.score <= max)
            && self
                .stale_after_ms
                .map_or(true, |after| record.is_stale(now_ms, after))
    }
}

fn contains_or_empty<T: Ord>(set: &BTreeSet<T>, value: Option<&T>) -> bool {
    set.is_empty() || value.is_some_and(|v| set.contains(v))
}
