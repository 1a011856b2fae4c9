use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use floorwatch_engine::{Engine, ManualClock};
use floorwatch_types::{MachineId, MachineMetadata, RawEvent, RawPayload, StateFilter, StatusClass};

/// Create an engine with `machines` machines spread over a few plants
fn populated_engine(machines: usize) -> Engine {
    let engine = Engine::builder()
        .clock(Arc::new(ManualClock::new(10_000)))
        .build()
        .unwrap();

    for i in 0..machines {
        let metadata = MachineMetadata {
            plant: Some(format!("Plant {}", i % 3)),
            line: Some(format!("Line {}", i % 7)),
            machine_type: Some("CNC".to_string()),
        };
        let raw = RawEvent::new(format!("m{i}"), "sensor", 1_000u64, RawPayload::status("RUNNING"))
            .with_metadata(metadata);
        engine.process(raw).unwrap();
        if i % 10 == 0 {
            let fault = RawEvent::new(format!("m{i}"), "fault_code", 2_000u64, RawPayload::code("F12"));
            engine.process(fault).unwrap();
        }
    }
    engine
}

/// Benchmark point reads (must not depend on fleet size)
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for machines in [10usize, 1_000, 50_000].iter() {
        let engine = populated_engine(*machines);
        let id = MachineId::from("m7");
        group.bench_with_input(BenchmarkId::from_parameter(machines), machines, |b, _| {
            b.iter(|| black_box(engine.get(black_box(&id)).unwrap()));
        });
    }
    group.finish();
}

/// Benchmark full fleet snapshot collection
fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");

    for machines in [10usize, 100, 1_000].iter() {
        let engine = populated_engine(*machines);
        group.bench_with_input(BenchmarkId::from_parameter(machines), machines, |b, _| {
            b.iter(|| black_box(engine.collect()));
        });
    }
    group.finish();
}

/// Benchmark filtering and summarizing a snapshot
fn bench_filter_and_summary(c: &mut Criterion) {
    let engine = populated_engine(1_000);
    let snapshot = engine.collect();
    let filter = StateFilter::all().plant("Plant 1").status(StatusClass::Fault);

    c.bench_function("filter_snapshot", |b| {
        b.iter(|| black_box(snapshot.filtered(black_box(&filter)).len()));
    });
    c.bench_function("summary", |b| {
        b.iter(|| black_box(snapshot.summary(30 * 60 * 1000)));
    });
}

/// Benchmark the refresh sweep when nothing changed
fn bench_refresh_idle(c: &mut Criterion) {
    let engine = populated_engine(1_000);
    engine.refresh();

    c.bench_function("refresh_idle_1000", |b| {
        b.iter(|| black_box(engine.refresh()));
    });
}

criterion_group!(
    benches,
    bench_get,
    bench_collect,
    bench_filter_and_summary,
    bench_refresh_idle,
);
criterion_main!(benches);
