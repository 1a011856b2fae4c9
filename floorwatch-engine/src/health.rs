//! Rolling-window health scoring.
//!
//! Each machine keeps a ring of fixed-width buckets keyed by event time.
//! A bucket is reused once its epoch falls out of the window, so memory per
//! machine is bounded by the bucket count.

use floorwatch_types::{
    HealthBand, HealthRecord, MachineId, Payload, Signal, SourceKind, TelemetryEvent,
    TimestampMs, WindowStats,
};

use crate::config::HealthConfig;

/// Counters for one slice of the window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Bucket {
    /// `timestamp / width` of the slice this bucket currently holds.
    epoch: Option<u64>,
    events: u32,
    faults: u32,
    status_samples: u32,
    up_samples: u32,
    readings: u32,
    deviation_sum: f64,
}

impl Bucket {
    fn reset(&mut self, epoch: u64) {
        *self = Bucket {
            epoch: Some(epoch),
            ..Bucket::default()
        };
    }
}

/// What one event adds to its bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Sample {
    fault: bool,
    up: Option<bool>,
    deviation: Option<f64>,
}

/// Result of recording an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Recorded,
    /// The event's bucket is older than the window at `now`.
    OutsideWindow,
}

/// Per-machine bucket ring.
#[derive(Debug, Clone)]
pub struct HealthWindow {
    buckets: Vec<Bucket>,
    width_ms: u64,
}

impl HealthWindow {
    fn new(buckets: u32, width_ms: u64) -> Self {
        Self {
            buckets: vec![Bucket::default(); buckets.max(1) as usize],
            width_ms: width_ms.max(1),
        }
    }

    fn len(&self) -> u64 {
        self.buckets.len() as u64
    }

    fn is_live(&self, epoch: u64, now_epoch: u64) -> bool {
        epoch <= now_epoch && now_epoch - epoch < self.len()
    }

    fn record(&mut self, timestamp_ms: TimestampMs, now_ms: TimestampMs, sample: Sample) -> Observation {
        // Producer clocks ahead of ours count as "now".
        let epoch = timestamp_ms.min(now_ms) / self.width_ms;
        let now_epoch = now_ms / self.width_ms;
        if !self.is_live(epoch, now_epoch) {
            return Observation::OutsideWindow;
        }

        let index = (epoch % self.len()) as usize;
        let bucket = &mut self.buckets[index];
        match bucket.epoch {
            Some(held) if held == epoch => {}
            Some(held) if held > epoch => return Observation::OutsideWindow,
            _ => bucket.reset(epoch),
        }

        bucket.events += 1;
        if sample.fault {
            bucket.faults += 1;
        }
        if let Some(up) = sample.up {
            bucket.status_samples += 1;
            if up {
                bucket.up_samples += 1;
            }
        }
        if let Some(deviation) = sample.deviation {
            bucket.readings += 1;
            bucket.deviation_sum += deviation;
        }
        Observation::Recorded
    }

    /// Aggregate the buckets still inside the window at `now`.
    pub fn stats(&self, now_ms: TimestampMs) -> WindowStats {
        let now_epoch = now_ms / self.width_ms;
        let mut stats = WindowStats::default();
        let mut deviation_sum = 0.0;

        for bucket in &self.buckets {
            match bucket.epoch {
                Some(epoch) if self.is_live(epoch, now_epoch) => {}
                _ => continue,
            }
            stats.events += bucket.events;
            stats.faults += bucket.faults;
            stats.status_samples += bucket.status_samples;
            stats.up_samples += bucket.up_samples;
            stats.readings += bucket.readings;
            deviation_sum += bucket.deviation_sum;
        }

        if stats.readings > 0 {
            stats.mean_deviation = Some(deviation_sum / f64::from(stats.readings));
        }
        stats
    }
}

/// Scores machines from their health windows.
#[derive(Debug, Clone, Default)]
pub struct HealthCalculator {
    config: HealthConfig,
}

impl HealthCalculator {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// An empty window sized by the configuration.
    pub fn window(&self) -> HealthWindow {
        HealthWindow::new(self.config.buckets, self.config.bucket_width_ms())
    }

    /// Record an accepted event in `window`.
    pub fn observe(
        &self,
        window: &mut HealthWindow,
        event: &TelemetryEvent,
        now_ms: TimestampMs,
    ) -> Observation {
        window.record(event.timestamp_ms, now_ms, self.sample(event))
    }

    fn sample(&self, event: &TelemetryEvent) -> Sample {
        match &event.payload {
            Payload::Signal(Signal::Assert(status)) => Sample {
                fault: event.kind == SourceKind::FaultCode,
                up: status.is_up(),
                deviation: None,
            },
            Payload::Signal(Signal::Clear) => Sample::default(),
            Payload::Reading(value) => {
                let offset = (value - self.config.reading_baseline).abs();
                Sample {
                    deviation: Some((offset / self.config.reading_tolerance).min(1.0)),
                    ..Sample::default()
                }
            }
        }
    }

    /// Score in `[min_score, max_score]` from the live part of the window.
    pub fn score_stats(&self, stats: &WindowStats) -> f64 {
        let c = &self.config;
        let components = [
            (c.fault_weight, stats.fault_ratio()),
            (c.uptime_weight, stats.uptime_ratio().map(|up| 1.0 - up)),
            (c.deviation_weight, stats.mean_deviation),
        ];

        let (weighted, total) = components
            .iter()
            .filter_map(|(weight, penalty)| penalty.map(|p| (*weight, p)))
            .fold((0.0, 0.0), |(sum, total), (w, p)| (sum + w * p, total + w));

        let unit = if total > 0.0 { 1.0 - weighted / total } else { 1.0 };
        (c.min_score + unit * (c.max_score - c.min_score)).clamp(c.min_score, c.max_score)
    }

    pub fn band(&self, score: f64) -> HealthBand {
        HealthBand::from_score(score, self.config.critical_threshold, self.config.nominal_threshold)
    }

    /// Full health record for a machine at `now`.
    pub fn score(&self, window: &HealthWindow, machine_id: &MachineId, now_ms: TimestampMs) -> HealthRecord {
        let stats = window.stats(now_ms);
        let score = self.score_stats(&stats);
        HealthRecord {
            machine_id: machine_id.clone(),
            score,
            band: self.band(score),
            window: stats,
            updated_at_ms: now_ms,
        }
    }
}
