//! Machine identity and static metadata.

use alloc::string::String;
use core::fmt;

use crate::TimestampMs;

/// Stable unique identifier of a monitored machine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
#[cfg_attr(feature = "minicbor", cbor(transparent))]
pub struct MachineId(#[cfg_attr(feature = "minicbor", n(0))] pub String);

impl MachineId {
    /// Create an ID from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(id: &str) -> Self {
        Self(String::from(id))
    }
}

impl From<String> for MachineId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Static descriptive metadata about a machine.
///
/// All fields are optional; producers attach whatever they know.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct MachineMetadata {
    /// Equipment type (e.g. "CNC", "Conveyor", "Press").
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(0))]
    pub machine_type: Option<String>,

    /// Plant the machine belongs to.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(1))]
    pub plant: Option<String>,

    /// Production line within the plant.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    #[cfg_attr(feature = "minicbor", n(2))]
    pub line: Option<String>,
}

impl MachineMetadata {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.machine_type.is_none() && self.plant.is_none() && self.line.is_none()
    }
}

/// A registered machine.
///
/// Created from the first observed event for its ID and never changed
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct Machine {
    #[cfg_attr(feature = "minicbor", n(0))]
    pub id: MachineId,

    #[cfg_attr(feature = "serde", serde(default))]
    #[cfg_attr(feature = "minicbor", n(1))]
    pub metadata: MachineMetadata,

    /// When the machine was first observed (ingestion time).
    #[cfg_attr(feature = "minicbor", n(2))]
    pub registered_at_ms: TimestampMs,
}

impl Machine {
    pub fn new(id: MachineId, metadata: MachineMetadata, registered_at_ms: TimestampMs) -> Self {
        Self {
            id,
            metadata,
            registered_at_ms,
        }
    }
}
