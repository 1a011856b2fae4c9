//! Engine configuration.
//!
//! Loaded once at startup from a TOML file plus `FLOORWATCH_*` environment
//! overrides and read-only afterwards.
//!
//! ```toml
//! [precedence]
//! maintenance_flag = 4
//! fault_code = 3
//! operator_override = 2
//! sensor = 1
//!
//! [staleness]
//! fault_code = "30m"
//!
//! [health]
//! window = "15m"
//! ```
//!
//! Environment overrides use `__` between section and key, for example
//! `FLOORWATCH_HEALTH__WINDOW=5m`.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use floorwatch_types::SourceKind;
use serde::Deserialize;

use crate::duration;
use crate::error::ConfigError;

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub precedence: PrecedenceConfig,
    pub staleness: StalenessConfig,
    pub health: HealthConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub subscriptions: SubscriptionConfig,
    pub engine: ScheduleConfig,
}

impl EngineConfig {
    /// Load from an optional TOML file and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix("FLOORWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text and validate. Ignores the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if SourceKind::ALL.iter().all(|kind| self.precedence.rank(*kind).is_none()) {
            return invalid("precedence table ranks no source kind");
        }

        let h = &self.health;
        let finite = [
            h.fault_weight,
            h.uptime_weight,
            h.deviation_weight,
            h.min_score,
            h.max_score,
            h.critical_threshold,
            h.nominal_threshold,
            h.reading_baseline,
            h.reading_tolerance,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return invalid("health settings must be finite numbers");
        }
        if h.fault_weight < 0.0 || h.uptime_weight < 0.0 || h.deviation_weight < 0.0 {
            return invalid("health weights must be non-negative");
        }
        if h.min_score >= h.max_score {
            return invalid("health.min_score must be below health.max_score");
        }
        if !(h.min_score <= h.critical_threshold
            && h.critical_threshold <= h.nominal_threshold
            && h.nominal_threshold <= h.max_score)
        {
            return invalid("health thresholds must satisfy min <= critical <= nominal <= max");
        }
        if h.reading_tolerance <= 0.0 {
            return invalid("health.reading_tolerance must be positive");
        }
        if h.buckets == 0 {
            return invalid("health.buckets must be at least 1");
        }
        if h.window_ms() < u64::from(h.buckets) {
            return invalid("health.window must be at least one millisecond per bucket");
        }

        if self.store.shards == 0 {
            return invalid("store.shards must be at least 1");
        }
        if self.pipeline.workers == 0 {
            return invalid("pipeline.workers must be at least 1");
        }
        if self.pipeline.queue_capacity == 0 || self.pipeline.dedup_capacity == 0 {
            return invalid("pipeline capacities must be at least 1");
        }
        if self.subscriptions.buffer == 0 {
            return invalid("subscriptions.buffer must be at least 1");
        }
        if self.engine.refresh_interval.is_zero() || self.engine.emit_interval.is_zero() {
            return invalid("engine intervals must be non-zero");
        }
        Ok(())
    }
}

/// Rank per source kind; higher wins. Kinds left out are not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrecedenceConfig {
    #[serde(default)]
    pub sensor: Option<u8>,
    #[serde(default)]
    pub operator_override: Option<u8>,
    #[serde(default)]
    pub maintenance_flag: Option<u8>,
    #[serde(default)]
    pub fault_code: Option<u8>,
}

impl PrecedenceConfig {
    pub fn rank(&self, kind: SourceKind) -> Option<u8> {
        match kind {
            SourceKind::Sensor => self.sensor,
            SourceKind::OperatorOverride => self.operator_override,
            SourceKind::MaintenanceFlag => self.maintenance_flag,
            SourceKind::FaultCode => self.fault_code,
        }
    }

    pub fn is_configured(&self, kind: SourceKind) -> bool {
        self.rank(kind).is_some()
    }
}

impl Default for PrecedenceConfig {
    /// maintenance lockout > fault code > operator override > sensor
    fn default() -> Self {
        Self {
            sensor: Some(1),
            operator_override: Some(2),
            maintenance_flag: Some(4),
            fault_code: Some(3),
        }
    }
}

/// Per-kind validity windows. A kind without a window never expires.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StalenessConfig {
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub sensor: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub operator_override: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub maintenance_flag: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub fault_code: Option<Duration>,
}

impl StalenessConfig {
    pub fn window(&self, kind: SourceKind) -> Option<Duration> {
        match kind {
            SourceKind::Sensor => self.sensor,
            SourceKind::OperatorOverride => self.operator_override,
            SourceKind::MaintenanceFlag => self.maintenance_flag,
            SourceKind::FaultCode => self.fault_code,
        }
    }

    /// Window in milliseconds, `None` if the kind never expires.
    pub fn window_ms(&self, kind: SourceKind) -> Option<u64> {
        self.window(kind).map(|d| d.as_millis() as u64)
    }
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            sensor: Some(Duration::from_secs(15 * 60)),
            operator_override: Some(Duration::from_secs(4 * 3600)),
            maintenance_flag: Some(Duration::from_secs(8 * 3600)),
            fault_code: Some(Duration::from_secs(30 * 60)),
        }
    }
}

/// Health window length, weighting, and score range.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(deserialize_with = "duration::deserialize")]
    pub window: Duration,
    /// Number of buckets the window is divided into.
    pub buckets: u32,
    pub fault_weight: f64,
    pub uptime_weight: f64,
    pub deviation_weight: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub critical_threshold: f64,
    pub nominal_threshold: f64,
    /// Expected value of numeric sensor readings.
    pub reading_baseline: f64,
    /// Deviation from the baseline that counts as fully abnormal.
    pub reading_tolerance: f64,
}

impl HealthConfig {
    pub fn window_ms(&self) -> u64 {
        self.window.as_millis() as u64
    }

    pub fn bucket_width_ms(&self) -> u64 {
        (self.window_ms() / u64::from(self.buckets.max(1))).max(1)
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            buckets: 15,
            fault_weight: 0.5,
            uptime_weight: 0.3,
            deviation_weight: 0.2,
            min_score: 0.0,
            max_score: 100.0,
            critical_threshold: 40.0,
            nominal_threshold: 80.0,
            reading_baseline: 50.0,
            reading_tolerance: 25.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub shards: usize,
    #[serde(deserialize_with = "duration::deserialize")]
    pub contention_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shards: 16,
            contention_timeout: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    /// Bounded queue length per worker.
    pub queue_capacity: usize,
    /// Hard ceiling on dedup keys per machine. Keys are otherwise kept
    /// for the length of the health window.
    pub dedup_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            dedup_capacity: 16_384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Pending notifications held per subscriber before dropping the oldest.
    pub buffer: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self { buffer: 256 }
    }
}

/// Background task intervals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// How often every machine is re-resolved against the clock.
    #[serde(deserialize_with = "duration::deserialize")]
    pub refresh_interval: Duration,
    /// How often fleet snapshots are emitted to outputs.
    #[serde(deserialize_with = "duration::deserialize")]
    pub emit_interval: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            emit_interval: Duration::from_secs(5),
        }
    }
}
