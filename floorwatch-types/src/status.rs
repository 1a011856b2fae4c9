//! Resolved machine status.

use alloc::string::String;
use core::fmt;

/// Words accepted as a running machine.
const RUNNING_WORDS: &[&str] = &["RUNNING", "NOMINAL", "OK", "ON"];
const IDLE_WORDS: &[&str] = &["IDLE"];
const STOPPED_WORDS: &[&str] = &["STOPPED", "OFF", "DOWN"];
const FAULT_WORDS: &[&str] = &["FAULT", "ERROR"];
const MAINTENANCE_WORDS: &[&str] = &[
    "MAINTENANCE",
    "UNDERMAINTENANCE",
    "UNDER_MAINTENANCE",
    "LOCKOUT",
];

fn matches_any(word: &str, words: &[&str]) -> bool {
    words.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// The single authoritative operational state of a machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub enum MachineStatus {
    /// No live signal is available.
    #[default]
    #[cfg_attr(feature = "minicbor", n(0))]
    Unknown,
    #[cfg_attr(feature = "minicbor", n(1))]
    Running,
    #[cfg_attr(feature = "minicbor", n(2))]
    Idle,
    #[cfg_attr(feature = "minicbor", n(3))]
    Stopped,
    #[cfg_attr(feature = "minicbor", n(4))]
    UnderMaintenance,
    /// Faulted, carrying the fault code that caused it.
    #[cfg_attr(feature = "minicbor", n(5))]
    Fault {
        #[cfg_attr(feature = "minicbor", n(0))]
        code: String,
    },
}

impl MachineStatus {
    /// Create a fault status with the given code.
    pub fn fault(code: impl Into<String>) -> Self {
        MachineStatus::Fault { code: code.into() }
    }

    /// Map a producer status word to a status (case-insensitive).
    ///
    /// Returns `None` for words outside the known vocabulary.
    pub fn from_word(word: &str) -> Option<Self> {
        let word = word.trim();
        if matches_any(word, RUNNING_WORDS) {
            Some(MachineStatus::Running)
        } else if matches_any(word, IDLE_WORDS) {
            Some(MachineStatus::Idle)
        } else if matches_any(word, STOPPED_WORDS) {
            Some(MachineStatus::Stopped)
        } else if matches_any(word, MAINTENANCE_WORDS) {
            Some(MachineStatus::UnderMaintenance)
        } else if matches_any(word, FAULT_WORDS) {
            Some(MachineStatus::fault(word))
        } else {
            None
        }
    }

    /// The coarse class of this status, used for filtering and counting.
    pub fn class(&self) -> StatusClass {
        match self {
            MachineStatus::Unknown => StatusClass::Unknown,
            MachineStatus::Running => StatusClass::Running,
            MachineStatus::Idle => StatusClass::Idle,
            MachineStatus::Stopped => StatusClass::Stopped,
            MachineStatus::UnderMaintenance => StatusClass::UnderMaintenance,
            MachineStatus::Fault { .. } => StatusClass::Fault,
        }
    }

    /// Whether this status counts as available time for uptime.
    ///
    /// `None` for `Unknown`, which carries no evidence either way.
    pub fn is_up(&self) -> Option<bool> {
        match self {
            MachineStatus::Unknown => None,
            MachineStatus::Running | MachineStatus::Idle => Some(true),
            MachineStatus::Stopped
            | MachineStatus::UnderMaintenance
            | MachineStatus::Fault { .. } => Some(false),
        }
    }
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineStatus::Fault { code } => f.write_str(code),
            other => f.write_str(other.class().label()),
        }
    }
}

/// Status without payload, for filters and fleet counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(index_only))]
pub enum StatusClass {
    #[cfg_attr(feature = "minicbor", n(0))]
    Unknown,
    #[cfg_attr(feature = "minicbor", n(1))]
    Running,
    #[cfg_attr(feature = "minicbor", n(2))]
    Idle,
    #[cfg_attr(feature = "minicbor", n(3))]
    Stopped,
    #[cfg_attr(feature = "minicbor", n(4))]
    UnderMaintenance,
    #[cfg_attr(feature = "minicbor", n(5))]
    Fault,
}

impl StatusClass {
    /// Display label, matching the dashboard vocabulary.
    pub fn label(&self) -> &'static str {
        match self {
            StatusClass::Unknown => "Unknown",
            StatusClass::Running => "Running",
            StatusClass::Idle => "Idle",
            StatusClass::Stopped => "Stopped",
            StatusClass::UnderMaintenance => "UnderMaintenance",
            StatusClass::Fault => "Fault",
        }
    }

    /// Parse a label (case-insensitive, `_` and spaces ignored).
    pub fn parse(label: &str) -> Option<Self> {
        const ALL: [StatusClass; 6] = [
            StatusClass::Unknown,
            StatusClass::Running,
            StatusClass::Idle,
            StatusClass::Stopped,
            StatusClass::UnderMaintenance,
            StatusClass::Fault,
        ];
        let mut normalized = String::with_capacity(label.len());
        normalized.extend(label.chars().filter(|c| *c != '_' && *c != ' '));
        ALL.into_iter()
            .find(|class| class.label().eq_ignore_ascii_case(&normalized))
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
