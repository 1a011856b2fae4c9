//! Open maintenance work orders per machine.
//!
//! A `maintenance_flag` assert carrying a reference opens that work order.
//! A clear with a reference closes it; a clear without one closes every
//! order opened at or before it. The newest event per reference wins, so
//! the open set does not depend on arrival order.

use std::collections::BTreeMap;

use floorwatch_types::{Signal, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Latest {
    timestamp_ms: TimestampMs,
    open: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WorkOrders {
    orders: BTreeMap<String, Latest>,
    cleared_through_ms: Option<TimestampMs>,
}

impl WorkOrders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a maintenance signal. Returns true if the open set changed.
    pub fn apply(&mut self, signal: &Signal, reference: Option<&str>, timestamp_ms: TimestampMs) -> bool {
        let before = self.open();
        match (signal, reference) {
            (Signal::Assert(_), Some(reference)) => self.record(reference, timestamp_ms, true),
            (Signal::Clear, Some(reference)) => self.record(reference, timestamp_ms, false),
            (Signal::Clear, None) => {
                let through = self.cleared_through_ms.map_or(timestamp_ms, |t| t.max(timestamp_ms));
                self.cleared_through_ms = Some(through);
                // Nothing at or before a clear-all can reopen.
                self.orders.retain(|_, latest| latest.timestamp_ms > through);
            }
            (Signal::Assert(_), None) => {}
        }
        self.open() != before
    }

    fn record(&mut self, reference: &str, timestamp_ms: TimestampMs, open: bool) {
        if self.cleared_through_ms.is_some_and(|through| timestamp_ms <= through) {
            return;
        }
        let incoming = Latest { timestamp_ms, open };
        match self.orders.get_mut(reference) {
            // Equal times: a close wins.
            Some(latest) if (latest.timestamp_ms, !latest.open) >= (timestamp_ms, !open) => {}
            Some(latest) => *latest = incoming,
            None => {
                self.orders.insert(reference.to_string(), incoming);
            }
        }
    }

    /// Open references, sorted.
    pub fn open(&self) -> Vec<String> {
        self.orders
            .iter()
            .filter(|(_, latest)| latest.open)
            .map(|(reference, _)| reference.clone())
            .collect()
    }
}
