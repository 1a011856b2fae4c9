//! Fleet reports for export and terminal output.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use floorwatch_engine::IngestCounters;
use floorwatch_types::{
    CurrentStateRecord, FleetSnapshot, FleetSummary, HealthBand, StateFilter, StatusClass,
};
use serde_json::{json, Value};

/// Whether a machine belongs on the attention list.
pub fn needs_attention(record: &CurrentStateRecord) -> bool {
    record.health.band == HealthBand::Critical
        || matches!(
            record.status.class(),
            StatusClass::Fault | StatusClass::UnderMaintenance
        )
}

/// Records matching `filter`, critical machines first, then by machine ID.
pub fn ordered<'a>(snapshot: &'a FleetSnapshot, filter: &'a StateFilter) -> Vec<&'a CurrentStateRecord> {
    let mut records = snapshot.filtered(filter);
    records.sort_by(|a, b| {
        b.health
            .band
            .cmp(&a.health.band)
            .then_with(|| a.machine.id.cmp(&b.machine.id))
    });
    records
}

fn machine_json(record: &CurrentStateRecord, now_ms: u64, stale_after_ms: u64) -> Value {
    let meta = &record.machine.metadata;
    json!({
        "machine_id": record.machine.id,
        "plant": meta.plant,
        "line": meta.line,
        "machine_type": meta.machine_type,
        "status": record.status.to_string(),
        "class": record.status.class().label(),
        "source": record.source.map(|kind| kind.name()),
        "health": record.health.score,
        "band": record.health.band,
        "version": record.version,
        "last_event_ms": record.last_event_ms,
        "stale": record.is_stale(now_ms, stale_after_ms),
        "open_work_orders": record.open_work_orders,
        "open_work_order_count": record.open_work_orders.len(),
        "signals": record.signals.iter().map(|s| {
            json!({
                "kind": s.kind.name(),
                "timestamp_ms": s.timestamp_ms,
                "reference": s.reference,
                "expired": s.expired,
            })
        }).collect::<Vec<_>>(),
    })
}

/// Build the export document for the machines matching `filter`.
pub fn build(
    snapshot: &FleetSnapshot,
    filter: &StateFilter,
    stale_after_ms: u64,
    stats: &IngestCounters,
) -> Value {
    let now = snapshot.timestamp_ms;
    let records = ordered(snapshot, filter);
    let summary = FleetSummary::from_records(records.iter().copied(), now, stale_after_ms);

    let machines: Vec<Value> = records
        .iter()
        .map(|record| machine_json(record, now, stale_after_ms))
        .collect();

    let attention: Vec<Value> = records
        .iter()
        .filter(|record| needs_attention(record))
        .map(|record| {
            json!({
                "machine_id": record.machine.id,
                "status": record.status.to_string(),
                "health": record.health.score,
                "band": record.health.band,
            })
        })
        .collect();

    // Maintenance queue: one row per open work order.
    let work_orders: Vec<Value> = records
        .iter()
        .flat_map(|record| {
            record.open_work_orders.iter().map(move |reference| {
                json!({
                    "reference": reference,
                    "machine_id": record.machine.id,
                    "plant": record.machine.metadata.plant,
                    "line": record.machine.metadata.line,
                    "status": record.status.to_string(),
                })
            })
        })
        .collect();

    json!({
        "generated_at_ms": now,
        "summary": summary,
        "machines": machines,
        "attention": attention,
        "work_orders": work_orders,
        "stats": stats,
    })
}

/// Write a report as pretty JSON.
pub fn write(report: &Value, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

/// One terminal line for a record update.
pub fn status_line(record: &CurrentStateRecord) -> String {
    let mut line = format!(
        "{:<12} {:<18} {:>5.1} {:<4} v{} ({})",
        record.machine.id.as_str(),
        record.status.to_string(),
        record.health.score,
        record.health.band.symbol(),
        record.version,
        record.source.map_or("none", |kind| kind.name()),
    );
    if record.has_open_work_orders() {
        line.push_str(&format!(" wo: {}", record.open_work_orders.join(",")));
    }
    line
}
