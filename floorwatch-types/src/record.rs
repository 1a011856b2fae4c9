//! The externally visible unit of truth for a machine.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::{
    HealthRecord, Machine, MachineId, MachineStatus, Signal, SourceKind, TimestampMs,
};

/// One retained per-kind signal, as it contributed to resolution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct SignalSnapshot {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub kind: SourceKind,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub signal: Signal,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub timestamp_ms: TimestampMs,
    #[cfg_attr(feature = "minicbor", n(3))]
    pub dedup_key: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(4))]
    pub reference: Option<String>,
    /// Older than the kind's staleness window at resolution time.
    #[cfg_attr(feature = "minicbor", n(5))]
    pub expired: bool,
}

/// Latest resolved status and health of one machine.
///
/// Exactly one exists per known machine; `version` strictly increases on
/// every mutation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct CurrentStateRecord {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub machine: Machine,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub status: MachineStatus,
    /// Source kind whose signal won resolution, if any.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub source: Option<SourceKind>,
    #[cfg_attr(feature = "minicbor", n(3))]
    pub health: HealthRecord,
    #[cfg_attr(feature = "minicbor", n(4))]
    pub signals: Vec<SignalSnapshot>,
    /// Generation of the retained signal set that produced `status`.
    #[cfg_attr(feature = "minicbor", n(5))]
    pub signal_generation: u64,
    /// Latest producer timestamp accepted for this machine.
    #[cfg_attr(feature = "minicbor", n(6))]
    pub last_event_ms: TimestampMs,
    #[cfg_attr(feature = "minicbor", n(7))]
    pub resolved_at_ms: TimestampMs,
    #[cfg_attr(feature = "minicbor", n(8))]
    pub version: u64,
    /// References of maintenance work orders still open, sorted.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    #[cfg_attr(feature = "minicbor", n(9))]
    pub open_work_orders: Vec<String>,
}

impl CurrentStateRecord {
    pub fn id(&self) -> &MachineId {
        &self.machine.id
    }

    /// True if no event newer than `stale_after_ms` before `now_ms` was seen.
    pub fn is_stale(&self, now_ms: TimestampMs, stale_after_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_event_ms) > stale_after_ms
    }

    pub fn has_open_work_orders(&self) -> bool {
        !self.open_work_orders.is_empty()
    }

    /// The retained signal for a kind, if present.
    pub fn signal(&self, kind: SourceKind) -> Option<&SignalSnapshot> {
        self.signals.iter().find(|s| s.kind == kind)
    }
}

impl fmt::Display for CurrentStateRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} {} health={:.1} [{}]",
            self.machine.id, self.version, self.status, self.health.score, self.health.band
        )?;
        if let Some(source) = self.source {
            write!(f, " via {}", source)?;
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn staleness_uses_last_event_time() {
        let mut rec = record("1001", MachineStatus::Running, 90.0, 1);
        rec.last_event_ms = 1_000;
        assert!(!rec.is_stale(1_500, 1_000));
        assert!(rec.is_stale(2_001, 1_000));
        // Clock behind the producer never counts as stale.
        assert!(!rec.is_stale(500, 1_000));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn record_without_work_orders_reads_back() {
        let rec = record("1001", MachineStatus::Running, 90.0, 1);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("open_work_orders"));
        let parsed: CurrentStateRecord = serde_json::from_str(&json).unwrap();
        assert!(!parsed.has_open_work_orders());
        assert_eq!(parsed, rec);
    }

    #[test]
    fn display_names_status_and_band() {
        let mut rec = record("1001", MachineStatus::fault("F12"), 12.5, 3);
        rec.source = Some(SourceKind::FaultCode);
        assert_eq!(rec.to_string(), "1001 v3 F12 health=12.5 [CRIT] via fault_code");
    }
}
