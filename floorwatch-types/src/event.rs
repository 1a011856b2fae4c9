//! Raw and normalized telemetry events.

use alloc::string::String;
use core::fmt;

use crate::{MachineId, MachineMetadata, MachineStatus, TimestampMs};

/// Origin category of a signal.
///
/// The discriminant doubles as a dense index (see [`SourceKind::index`]),
/// so per-machine state can hold one slot per kind in a fixed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum SourceKind {
    #[cfg_attr(feature = "minicbor", n(0))]
    Sensor,
    #[cfg_attr(feature = "minicbor", n(1))]
    OperatorOverride,
    #[cfg_attr(feature = "minicbor", n(2))]
    MaintenanceFlag,
    #[cfg_attr(feature = "minicbor", n(3))]
    FaultCode,
}

impl SourceKind {
    /// Number of source kinds.
    pub const COUNT: usize = 4;

    /// All kinds, in index order.
    pub const ALL: [SourceKind; SourceKind::COUNT] = [
        SourceKind::Sensor,
        SourceKind::OperatorOverride,
        SourceKind::MaintenanceFlag,
        SourceKind::FaultCode,
    ];

    /// Dense index in `0..COUNT`.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Config and wire name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Sensor => "sensor",
            SourceKind::OperatorOverride => "operator_override",
            SourceKind::MaintenanceFlag => "maintenance_flag",
            SourceKind::FaultCode => "fault_code",
        }
    }

    /// Parse a wire name. Accepts `-` in place of `_`.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|kind| {
            kind.name().len() == name.len()
                && kind
                    .name()
                    .bytes()
                    .zip(name.bytes())
                    .all(|(a, b)| a == b.to_ascii_lowercase() || (a == b'_' && b == b'-'))
        })
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Producer-supplied timestamp, before parsing.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum RawTimestamp {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// RFC 3339 or `YYYY-MM-DD HH:MM[:SS]` (UTC).
    Text(String),
}

impl From<TimestampMs> for RawTimestamp {
    fn from(ms: TimestampMs) -> Self {
        RawTimestamp::Millis(ms as i64)
    }
}

impl From<&str> for RawTimestamp {
    fn from(text: &str) -> Self {
        RawTimestamp::Text(String::from(text))
    }
}

/// Producer-supplied payload, before shape validation.
///
/// Exactly one field is expected to be set; which one depends on the
/// source kind.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RawPayload {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub status: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub code: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub reading: Option<f64>,
}

impl RawPayload {
    pub fn status(word: impl Into<String>) -> Self {
        Self {
            status: Some(word.into()),
            ..Default::default()
        }
    }

    pub fn code(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Default::default()
        }
    }

    pub fn reading(value: f64) -> Self {
        Self {
            reading: Some(value),
            ..Default::default()
        }
    }

    /// Number of fields set.
    pub fn field_count(&self) -> usize {
        usize::from(self.status.is_some())
            + usize::from(self.code.is_some())
            + usize::from(self.reading.is_some())
    }
}

/// An event as received at the ingestion boundary.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawEvent {
    pub machine_id: String,
    pub source: String,
    pub timestamp: RawTimestamp,
    pub payload: RawPayload,

    /// Sequence/dedup key. Derived from the event content when absent.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub dedup_key: Option<String>,

    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "MachineMetadata::is_empty"))]
    pub metadata: MachineMetadata,

    /// Work order, operator report, or other upstream reference.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub reference: Option<String>,
}

impl RawEvent {
    /// Create a raw event with no dedup key, metadata, or reference.
    pub fn new(
        machine_id: impl Into<String>,
        source: impl Into<String>,
        timestamp: impl Into<RawTimestamp>,
        payload: RawPayload,
    ) -> Self {
        Self {
            machine_id: machine_id.into(),
            source: source.into(),
            timestamp: timestamp.into(),
            payload,
            dedup_key: None,
            metadata: MachineMetadata::default(),
            reference: None,
        }
    }

    /// Set the dedup key.
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }

    /// Attach machine metadata.
    pub fn with_metadata(mut self, metadata: MachineMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach an upstream reference.
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// A status-bearing signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum Signal {
    /// The source asserts this status.
    #[cfg_attr(feature = "minicbor", n(0))]
    Assert(#[cfg_attr(feature = "minicbor", n(0))] MachineStatus),
    /// The source withdraws its assertion (e.g. maintenance released).
    #[cfg_attr(feature = "minicbor", n(1))]
    Clear,
}

impl Signal {
    /// The asserted status, if any.
    pub fn status(&self) -> Option<&MachineStatus> {
        match self {
            Signal::Assert(status) => Some(status),
            Signal::Clear => None,
        }
    }
}

/// Canonical event payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum Payload {
    /// Status-bearing signal, consumed by precedence resolution and health.
    #[cfg_attr(feature = "minicbor", n(0))]
    Signal(#[cfg_attr(feature = "minicbor", n(0))] Signal),
    /// Numeric sensor reading, consumed by health only.
    #[cfg_attr(feature = "minicbor", n(1))]
    Reading(#[cfg_attr(feature = "minicbor", n(0))] f64),
}

/// A validated, canonical event. Immutable once accepted.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct TelemetryEvent {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub machine_id: MachineId,
    #[cfg_attr(feature = "minicbor", n(1))]
    pub kind: SourceKind,
    /// Producer-assigned event time.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub timestamp_ms: TimestampMs,
    #[cfg_attr(feature = "minicbor", n(3))]
    pub ingested_at_ms: TimestampMs,
    #[cfg_attr(feature = "minicbor", n(4))]
    pub payload: Payload,
    #[cfg_attr(feature = "minicbor", n(5))]
    pub dedup_key: String,
    #[cfg_attr(feature = "minicbor", n(6))]
    pub reference: Option<String>,
    #[cfg_attr(feature = "minicbor", n(7))]
    pub metadata: MachineMetadata,
}

impl TelemetryEvent {
    /// The signal carried by this event, if it is status-bearing.
    pub fn signal(&self) -> Option<&Signal> {
        match &self.payload {
            Payload::Signal(signal) => Some(signal),
            Payload::Reading(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_index_is_dense() {
        for (i, kind) in SourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn kind_parse_accepts_wire_variants() {
        assert_eq!(SourceKind::parse("sensor"), Some(SourceKind::Sensor));
        assert_eq!(SourceKind::parse("Operator-Override"), Some(SourceKind::OperatorOverride));
        assert_eq!(SourceKind::parse("MAINTENANCE_FLAG"), Some(SourceKind::MaintenanceFlag));
        assert_eq!(SourceKind::parse("fault"), None);
    }

    #[test]
    fn payload_field_count() {
        assert_eq!(RawPayload::default().field_count(), 0);
        assert_eq!(RawPayload::reading(1.0).field_count(), 1);
        let both = RawPayload {
            status: Some("RUNNING".into()),
            reading: Some(2.0),
            ..Default::default()
        };
        assert_eq!(both.field_count(), 2);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn raw_event_accepts_numeric_and_text_timestamps() {
        let numeric: RawEvent = serde_json::from_str(
            r#"{"machine_id":"1001","source":"sensor","timestamp":1700000000000,"payload":{"reading":71.5}}"#,
        )
        .unwrap();
        assert_eq!(numeric.timestamp, RawTimestamp::Millis(1_700_000_000_000));
        assert!(numeric.metadata.is_empty());

        let text: RawEvent = serde_json::from_str(
            r#"{"machine_id":"1001","source":"fault_code","timestamp":"2026-10-17T10:00:00Z",
                "payload":{"code":"F12"},"dedup_key":"e-1","metadata":{"plant":"Plant A"}}"#,
        )
        .unwrap();
        assert_eq!(text.timestamp, RawTimestamp::from("2026-10-17T10:00:00Z"));
        assert_eq!(text.dedup_key.as_deref(), Some("e-1"));
        assert_eq!(text.metadata.plant.as_deref(), Some("Plant A"));
    }
}
