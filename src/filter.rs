//! Command-line machine filters.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use floorwatch_engine::parse_duration;
use floorwatch_types::{StateFilter, StatusClass};

/// Parse a duration argument such as `30m` or `500ms`.
pub fn parse_duration_arg(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

/// Which machines to print or export.
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Only machines in this plant (repeatable)
    #[arg(long = "plant")]
    pub plants: Vec<String>,

    /// Only machines on this line (repeatable)
    #[arg(long = "line")]
    pub lines: Vec<String>,

    /// Only machines in this status class, e.g. Fault, Running (repeatable)
    #[arg(long = "status")]
    pub statuses: Vec<String>,

    /// Minimum health score
    #[arg(long)]
    pub min_health: Option<f64>,

    /// Maximum health score
    #[arg(long)]
    pub max_health: Option<f64>,

    /// Only machines with no event for longer than --stale-after
    #[arg(long)]
    pub stale_only: bool,

    /// Silence after which a machine counts as stale (e.g. "30m", "2h")
    #[arg(long, default_value = "30m", value_parser = parse_duration_arg)]
    pub stale_after: Duration,
}

impl FilterArgs {
    pub fn stale_after_ms(&self) -> u64 {
        self.stale_after.as_millis() as u64
    }

    /// Build the engine filter, rejecting unknown status names.
    pub fn to_filter(&self) -> Result<StateFilter> {
        let mut filter = StateFilter::all();
        for plant in &self.plants {
            filter = filter.plant(plant.as_str());
        }
        for line in &self.lines {
            filter = filter.line(line.as_str());
        }
        for name in &self.statuses {
            match StatusClass::parse(name) {
                Some(class) => filter = filter.status(class),
                None => bail!("unknown status class '{}'", name),
            }
        }
        if let (Some(min), Some(max)) = (self.min_health, self.max_health) {
            if min > max {
                bail!("--min-health {} is above --max-health {}", min, max);
            }
        }
        filter.min_health = self.min_health;
        filter.max_health = self.max_health;
        if self.stale_only {
            filter = filter.stale_only(self.stale_after_ms());
        }
        Ok(filter)
    }
}
