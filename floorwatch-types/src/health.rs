//! Health score records.

use core::fmt;

use crate::{MachineId, TimestampMs};

/// Coarse health classification derived from the score.
///
/// Ordered by severity so sorting descending puts critical machines first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum HealthBand {
    #[default]
    #[cfg_attr(feature = "minicbor", n(0))]
    Nominal,
    #[cfg_attr(feature = "minicbor", n(1))]
    Degraded,
    #[cfg_attr(feature = "minicbor", n(2))]
    Critical,
}

impl HealthBand {
    /// Classify a score against the critical and nominal thresholds.
    ///
    /// At or below `critical` is critical; at or above `nominal` is nominal.
    pub fn from_score(score: f64, critical: f64, nominal: f64) -> Self {
        if score <= critical {
            HealthBand::Critical
        } else if score >= nominal {
            HealthBand::Nominal
        } else {
            HealthBand::Degraded
        }
    }

    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            HealthBand::Nominal => "OK",
            HealthBand::Degraded => "WARN",
            HealthBand::Critical => "CRIT",
        }
    }
}

impl fmt::Display for HealthBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Aggregate of the signals currently inside a machine's health window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct WindowStats {
    /// Events of any kind in the window.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub events: u32,
    /// Fault-code assertions in the window.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub faults: u32,
    /// Signals that said something about availability.
    #[cfg_attr(feature = "minicbor", n(2))]
    pub status_samples: u32,
    /// Status samples that counted as up.
    #[cfg_attr(feature = "minicbor", n(3))]
    pub up_samples: u32,
    /// Numeric sensor readings in the window.
    #[cfg_attr(feature = "minicbor", n(4))]
    pub readings: u32,
    /// Mean normalized deviation of readings, in `0.0..=1.0`.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(5))]
    pub mean_deviation: Option<f64>,
}

impl WindowStats {
    /// Fraction of events that were faults.
    pub fn fault_ratio(&self) -> Option<f64> {
        (self.events > 0).then(|| f64::from(self.faults) / f64::from(self.events))
    }

    /// Fraction of status samples that were up.
    pub fn uptime_ratio(&self) -> Option<f64> {
        (self.status_samples > 0)
            .then(|| f64::from(self.up_samples) / f64::from(self.status_samples))
    }

    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// Rolling health of one machine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct HealthRecord {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub machine_id: MachineId,
    /// Score within the configured range.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub score: f64,
    #[cfg_attr(feature = "minicbor", n(2))]
    pub band: HealthBand,
    #[cfg_attr(feature = "minicbor", n(3))]
    pub window: WindowStats,
    #[cfg_attr(feature = "minicbor", n(4))]
    pub updated_at_ms: TimestampMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_thresholds_are_inclusive() {
        assert_eq!(HealthBand::from_score(40.0, 40.0, 80.0), HealthBand::Critical);
        assert_eq!(HealthBand::from_score(40.1, 40.0, 80.0), HealthBand::Degraded);
        assert_eq!(HealthBand::from_score(80.0, 40.0, 80.0), HealthBand::Nominal);
        assert_eq!(HealthBand::from_score(0.0, 40.0, 80.0), HealthBand::Critical);
    }

    #[test]
    fn critical_sorts_last() {
        let mut bands = [HealthBand::Critical, HealthBand::Nominal, HealthBand::Degraded];
        bands.sort();
        assert_eq!(bands, [HealthBand::Nominal, HealthBand::Degraded, HealthBand::Critical]);
    }

    #[test]
    fn ratios_are_none_without_samples() {
        let empty = WindowStats::default();
        assert!(empty.is_empty());
        assert_eq!(empty.fault_ratio(), None);
        assert_eq!(empty.uptime_ratio(), None);

        let stats = WindowStats {
            events: 4,
            faults: 1,
            status_samples: 2,
            up_samples: 1,
            ..Default::default()
        };
        assert_eq!(stats.fault_ratio(), Some(0.25));
        assert_eq!(stats.uptime_ratio(), Some(0.5));
    }
}
