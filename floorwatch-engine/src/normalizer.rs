//! Validation and canonicalization of raw events.

use chrono::{DateTime, NaiveDateTime};
use floorwatch_types::{
    MachineId, MachineStatus, Payload, RawEvent, RawPayload, RawTimestamp, Signal, SourceKind,
    TelemetryEvent, TimestampMs,
};

use crate::config::PrecedenceConfig;
use crate::error::MalformedEventError;

/// Fault codes that withdraw an active fault.
const FAULT_CLEAR_CODES: &[&str] = &["CLEAR", "CLEARED", "RESET"];

/// Maintenance flag words that release a lockout.
const MAINTENANCE_CLEAR_WORDS: &[&str] =
    &["CLEAR", "CLEARED", "RELEASED", "DONE", "COMPLETE", "OFF", "FALSE"];

/// Maintenance flag words that assert a lockout, besides the maintenance
/// status words themselves.
const MAINTENANCE_SET_WORDS: &[&str] = &["ON", "TRUE", "ACTIVE", "SET"];

/// Naive layouts accepted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S%.f",
];

fn is_one_of(word: &str, words: &[&str]) -> bool {
    words.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// Turns [`RawEvent`]s into [`TelemetryEvent`]s.
///
/// Stateless apart from the precedence table, which decides which source
/// kinds are accepted.
#[derive(Debug, Clone)]
pub struct Normalizer {
    precedence: PrecedenceConfig,
}

impl Normalizer {
    pub fn new(precedence: PrecedenceConfig) -> Self {
        Self { precedence }
    }

    /// Validate a raw event and produce its canonical form.
    pub fn normalize(
        &self,
        raw: RawEvent,
        ingested_at_ms: TimestampMs,
    ) -> Result<TelemetryEvent, MalformedEventError> {
        let machine_id = raw.machine_id.trim();
        if machine_id.is_empty() {
            return Err(MalformedEventError::EmptyMachineId);
        }

        let kind = SourceKind::parse(&raw.source)
            .ok_or_else(|| MalformedEventError::UnknownSourceKind(raw.source.clone()))?;
        if !self.precedence.is_configured(kind) {
            return Err(MalformedEventError::UnconfiguredSourceKind(kind));
        }

        let timestamp_ms = parse_timestamp(&raw.timestamp)?;
        let payload = canonical_payload(kind, &raw.payload)?;

        let reference = raw.reference.filter(|r| !r.trim().is_empty());
        let dedup_key = match raw.dedup_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => derive_dedup_key(machine_id, kind, timestamp_ms, &payload, reference.as_deref()),
        };

        Ok(TelemetryEvent {
            machine_id: MachineId::from(machine_id),
            kind,
            timestamp_ms,
            ingested_at_ms,
            payload,
            dedup_key,
            reference,
            metadata: raw.metadata,
        })
    }
}

/// Parse a producer timestamp into Unix milliseconds.
///
/// Accepts epoch milliseconds (as a number or numeric string), RFC 3339, and
/// `YYYY-MM-DD HH:MM[:SS]` interpreted as UTC. Times before the epoch are
/// rejected.
pub fn parse_timestamp(raw: &RawTimestamp) -> Result<TimestampMs, MalformedEventError> {
    let invalid = |text: String| MalformedEventError::InvalidTimestamp(text);

    let millis = match raw {
        RawTimestamp::Millis(ms) => *ms,
        RawTimestamp::Text(text) => {
            let text = text.trim();
            if let Ok(ms) = text.parse::<i64>() {
                ms
            } else if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                dt.timestamp_millis()
            } else {
                NAIVE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                    .map(|naive| naive.and_utc().timestamp_millis())
                    .ok_or_else(|| invalid(text.to_string()))?
            }
        }
    };

    u64::try_from(millis).map_err(|_| invalid(format!("{millis} is before the epoch")))
}

fn canonical_payload(
    kind: SourceKind,
    payload: &RawPayload,
) -> Result<Payload, MalformedEventError> {
    if payload.field_count() != 1 {
        return Err(MalformedEventError::PayloadShape {
            kind,
            reason: "expected exactly one of status, code or reading",
        });
    }

    let unknown = |word: &str| MalformedEventError::UnknownStatus {
        kind,
        word: word.to_string(),
    };

    match kind {
        SourceKind::Sensor => {
            if let Some(value) = payload.reading {
                if !value.is_finite() {
                    return Err(MalformedEventError::InvalidReading);
                }
                return Ok(Payload::Reading(value));
            }
            let word = payload.status.as_deref().ok_or(MalformedEventError::PayloadShape {
                kind,
                reason: "sensors report a status or a reading",
            })?;
            let status = MachineStatus::from_word(word).ok_or_else(|| unknown(word))?;
            Ok(Payload::Signal(Signal::Assert(status)))
        }
        SourceKind::OperatorOverride => {
            let word = payload.status.as_deref().ok_or(MalformedEventError::PayloadShape {
                kind,
                reason: "operator overrides carry a status",
            })?;
            let status = MachineStatus::from_word(word).ok_or_else(|| unknown(word))?;
            Ok(Payload::Signal(Signal::Assert(status)))
        }
        SourceKind::MaintenanceFlag => {
            let word = payload.status.as_deref().ok_or(MalformedEventError::PayloadShape {
                kind,
                reason: "maintenance flags carry a status",
            })?;
            let word = word.trim();
            if is_one_of(word, MAINTENANCE_CLEAR_WORDS) {
                Ok(Payload::Signal(Signal::Clear))
            } else if is_one_of(word, MAINTENANCE_SET_WORDS)
                || MachineStatus::from_word(word) == Some(MachineStatus::UnderMaintenance)
            {
                Ok(Payload::Signal(Signal::Assert(MachineStatus::UnderMaintenance)))
            } else {
                Err(unknown(word))
            }
        }
        SourceKind::FaultCode => {
            let code = payload.code.as_deref().ok_or(MalformedEventError::PayloadShape {
                kind,
                reason: "fault events carry a code",
            })?;
            let code = code.trim();
            if code.is_empty() {
                Err(MalformedEventError::PayloadShape {
                    kind,
                    reason: "fault code is empty",
                })
            } else if is_one_of(code, FAULT_CLEAR_CODES) {
                Ok(Payload::Signal(Signal::Clear))
            } else {
                Ok(Payload::Signal(Signal::Assert(MachineStatus::fault(code))))
            }
        }
    }
}

/// Deterministic key for events that arrive without one.
fn derive_dedup_key(
    machine_id: &str,
    kind: SourceKind,
    timestamp_ms: TimestampMs,
    payload: &Payload,
    reference: Option<&str>,
) -> String {
    let content = match payload {
        Payload::Signal(Signal::Assert(MachineStatus::Fault { code })) => format!("fault={code}"),
        Payload::Signal(Signal::Assert(status)) => status.class().label().to_string(),
        Payload::Signal(Signal::Clear) => "clear".to_string(),
        Payload::Reading(value) => format!("reading={value}"),
    };
    match reference {
        Some(reference) => format!("{machine_id}:{kind}:{timestamp_ms}:{content}:{reference}"),
        None => format!("{machine_id}:{kind}:{timestamp_ms}:{content}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floorwatch_types::MachineMetadata;

    fn normalizer() -> Normalizer {
        Normalizer::new(PrecedenceConfig::default())
    }

    fn raw(kind: &str, ts: u64, payload: RawPayload) -> RawEvent {
        RawEvent::new("1001", kind, ts, payload)
    }

    #[test]
    fn accepts_each_kind() {
        let n = normalizer();

        let event = n.normalize(raw("sensor", 1, RawPayload::status("nominal")), 9).unwrap();
        assert_eq!(event.signal(), Some(&Signal::Assert(MachineStatus::Running)));
        assert_eq!(event.ingested_at_ms, 9);

        let event = n.normalize(raw("sensor", 1, RawPayload::reading(71.5)), 9).unwrap();
        assert_eq!(event.payload, Payload::Reading(71.5));

        let event = n
            .normalize(raw("operator_override", 1, RawPayload::status("IDLE")), 9)
            .unwrap();
        assert_eq!(event.signal(), Some(&Signal::Assert(MachineStatus::Idle)));

        let event = n
            .normalize(raw("maintenance_flag", 1, RawPayload::status("lockout")), 9)
            .unwrap();
        assert_eq!(
            event.signal(),
            Some(&Signal::Assert(MachineStatus::UnderMaintenance))
        );

        let event = n.normalize(raw("fault_code", 1, RawPayload::code(" F12 ")), 9).unwrap();
        assert_eq!(event.signal(), Some(&Signal::Assert(MachineStatus::fault("F12"))));
    }

    #[test]
    fn clear_words_withdraw_signals() {
        let n = normalizer();
        let event = n.normalize(raw("fault_code", 1, RawPayload::code("reset")), 0).unwrap();
        assert_eq!(event.signal(), Some(&Signal::Clear));
        let event = n
            .normalize(raw("maintenance_flag", 1, RawPayload::status("Released")), 0)
            .unwrap();
        assert_eq!(event.signal(), Some(&Signal::Clear));
    }

    #[test]
    fn rejects_bad_shapes() {
        let n = normalizer();
        assert_eq!(
            n.normalize(RawEvent::new("  ", "sensor", 1u64, RawPayload::reading(1.0)), 0),
            Err(MalformedEventError::EmptyMachineId)
        );
        assert_eq!(
            n.normalize(raw("vibration", 1, RawPayload::reading(1.0)), 0),
            Err(MalformedEventError::UnknownSourceKind("vibration".into()))
        );
        assert!(matches!(
            n.normalize(raw("fault_code", 1, RawPayload::status("RUNNING")), 0),
            Err(MalformedEventError::PayloadShape { kind: SourceKind::FaultCode, .. })
        ));
        assert!(matches!(
            n.normalize(raw("fault_code", 1, RawPayload::code("  ")), 0),
            Err(MalformedEventError::PayloadShape { .. })
        ));
        assert!(matches!(
            n.normalize(raw("sensor", 1, RawPayload::default()), 0),
            Err(MalformedEventError::PayloadShape { .. })
        ));
        assert_eq!(
            n.normalize(raw("sensor", 1, RawPayload::reading(f64::NAN)), 0),
            Err(MalformedEventError::InvalidReading)
        );
        assert!(matches!(
            n.normalize(raw("operator_override", 1, RawPayload::status("sleepy")), 0),
            Err(MalformedEventError::UnknownStatus { .. })
        ));
    }

    #[test]
    fn rejects_kinds_missing_from_precedence() {
        let precedence = PrecedenceConfig {
            maintenance_flag: None,
            ..PrecedenceConfig::default()
        };
        let n = Normalizer::new(precedence);
        assert_eq!(
            n.normalize(raw("maintenance_flag", 1, RawPayload::status("lockout")), 0),
            Err(MalformedEventError::UnconfiguredSourceKind(SourceKind::MaintenanceFlag))
        );
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp(&RawTimestamp::Millis(1_000)), Ok(1_000));
        assert_eq!(parse_timestamp(&RawTimestamp::from("1500")), Ok(1_500));
        assert_eq!(
            parse_timestamp(&RawTimestamp::from("1970-01-01T00:00:01Z")),
            Ok(1_000)
        );
        assert_eq!(
            parse_timestamp(&RawTimestamp::from("1970-01-01T01:00:01+01:00")),
            Ok(1_000)
        );
        assert_eq!(parse_timestamp(&RawTimestamp::from("1970-01-01 00:01")), Ok(60_000));
        assert_eq!(
            parse_timestamp(&RawTimestamp::from("1970-01-01 00:01:30")),
            Ok(90_000)
        );
        assert!(parse_timestamp(&RawTimestamp::Millis(-1)).is_err());
        assert!(parse_timestamp(&RawTimestamp::from("1969-12-31T23:59:59Z")).is_err());
        assert!(parse_timestamp(&RawTimestamp::from("yesterday")).is_err());
    }

    #[test]
    fn derived_dedup_key_is_deterministic() {
        let n = normalizer();
        let a = n.normalize(raw("fault_code", 7, RawPayload::code("F12")), 1).unwrap();
        let b = n.normalize(raw("fault_code", 7, RawPayload::code("F12")), 2).unwrap();
        assert_eq!(a.dedup_key, b.dedup_key);
        assert_eq!(a.dedup_key, "1001:fault_code:7:fault=F12");

        let c = n.normalize(raw("fault_code", 8, RawPayload::code("F12")), 1).unwrap();
        assert_ne!(a.dedup_key, c.dedup_key);

        // Two work orders flagged in the same millisecond stay distinct.
        let d = n
            .normalize(raw("maintenance_flag", 7, RawPayload::status("ON")).with_reference("WO-3"), 1)
            .unwrap();
        assert_eq!(d.dedup_key, "1001:maintenance_flag:7:UnderMaintenance:WO-3");
    }

    #[test]
    fn explicit_dedup_key_and_metadata_pass_through() {
        let metadata = MachineMetadata {
            plant: Some("Plant A".into()),
            ..Default::default()
        };
        let event = normalizer()
            .normalize(
                raw("operator_override", 3, RawPayload::status("running"))
                    .with_dedup_key("op-77")
                    .with_metadata(metadata.clone())
                    .with_reference("WO-12"),
                0,
            )
            .unwrap();
        assert_eq!(event.dedup_key, "op-77");
        assert_eq!(event.metadata, metadata);
        assert_eq!(event.reference.as_deref(), Some("WO-12"));
    }
}
