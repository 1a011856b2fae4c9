//! Version stamp on exported fleet snapshots.
//!
//! Schema history:
//!
//! - `1.0`: machine records with resolved status, health window, and the
//!   retained signal per source kind.
//! - `1.1`: records carry `open_work_orders`; summaries count them. A 1.0
//!   JSON snapshot reads back with no open work orders.

use crate::SCHEMA_VERSION;

/// Minor revision of [`SCHEMA_VERSION`] written by this library.
pub const SCHEMA_MINOR: u32 = 1;

/// `major.minor` schema of a fleet snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "minicbor", derive(minicbor::Encode, minicbor::Decode))]
pub struct SchemaVersion {
    /// Changes when a record field is removed or changes meaning.
    #[cfg_attr(feature = "minicbor", n(0))]
    pub major: u32,

    /// Changes when a field with an empty default is added.
    #[cfg_attr(feature = "minicbor", n(1))]
    pub minor: u32,
}

impl SchemaVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// The schema this library writes.
    pub const fn current() -> Self {
        Self::new(SCHEMA_VERSION, SCHEMA_MINOR)
    }

    /// True if this library can read a snapshot stamped with `self`.
    pub fn is_compatible(&self) -> bool {
        self.major == SCHEMA_VERSION
    }

    /// Compatible, but written by a newer minor; fields this library does
    /// not know about are dropped on read.
    pub fn is_newer_minor(&self) -> bool {
        self.is_compatible() && self.minor > SCHEMA_MINOR
    }

    /// Whether records carry open work orders.
    pub fn tracks_work_orders(&self) -> bool {
        *self >= Self::new(1, 1)
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}
