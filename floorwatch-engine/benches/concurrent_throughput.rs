use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use floorwatch_engine::{Engine, ManualClock};
use floorwatch_types::{MachineId, RawEvent, RawPayload, StateFilter};

const EVENTS_PER_THREAD: u64 = 1_000;

fn engine() -> Engine {
    Engine::builder()
        .clock(Arc::new(ManualClock::new(EVENTS_PER_THREAD * 16)))
        .build()
        .unwrap()
}

/// Benchmark threads ingesting for disjoint machines
fn bench_disjoint_machines(c: &mut Criterion) {
    let mut group = c.benchmark_group("disjoint_machines");

    for threads in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*threads as u64 * EVENTS_PER_THREAD));
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            b.iter(|| {
                let engine = engine();
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let engine = engine.clone();
                        thread::spawn(move || {
                            for ts in 1..=EVENTS_PER_THREAD {
                                let raw = RawEvent::new(
                                    format!("m{t}-{}", ts % 16),
                                    "sensor",
                                    ts,
                                    RawPayload::reading(ts as f64 % 100.0),
                                );
                                let _ = engine.process(raw);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark threads contending on one hot machine
fn bench_hot_machine(c: &mut Criterion) {
    let mut group = c.benchmark_group("hot_machine");

    for threads in [2usize, 4, 8].iter() {
        group.throughput(Throughput::Elements(*threads as u64 * EVENTS_PER_THREAD));
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            b.iter(|| {
                let engine = engine();
                let handles: Vec<_> = (0..threads as u64)
                    .map(|t| {
                        let engine = engine.clone();
                        thread::spawn(move || {
                            for n in 1..=EVENTS_PER_THREAD {
                                let ts = n * 16 + t;
                                let raw = RawEvent::new("hot", "operator_override", ts, RawPayload::status("RUNNING"));
                                let _ = engine.process(raw);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark point reads while writers are active
fn bench_reads_under_writes(c: &mut Criterion) {
    let engine = engine();
    engine
        .process(RawEvent::new("1001", "sensor", 1u64, RawPayload::status("RUNNING")))
        .unwrap();
    let _sub = engine.subscribe(StateFilter::all());

    let writer = {
        let engine = engine.clone();
        thread::spawn(move || {
            for ts in 2..200_000u64 {
                let word = if ts % 2 == 0 { "IDLE" } else { "RUNNING" };
                let _ = engine.process(RawEvent::new("1001", "sensor", ts, RawPayload::status(word)));
            }
        })
    };

    let id = MachineId::from("1001");
    c.bench_function("get_under_writes", |b| {
        b.iter(|| black_box(engine.get(&id).unwrap().version));
    });

    writer.join().unwrap();
}

criterion_group!(
    benches,
    bench_disjoint_machines,
    bench_hot_machine,
    bench_reads_under_writes,
);
criterion_main!(benches);
