//! # floorwatch-types
//!
//! Core types for resolving factory equipment state. This crate defines the
//! shared schema used by the floorwatch engine, its outputs, and any consumer
//! (dashboards, exporters) reading resolved machine state.
//!
//! ## Design Goals
//!
//! - **Zero required dependencies**: Core types work without any serialization framework
//! - **Optional serialization**: Enable `serde` and/or `minicbor` features as needed
//! - **Closed vocabularies**: Source kinds and statuses are enums, not strings
//! - **Versioned schema**: Fleet snapshots include version info for forward compatibility
//!
//! ## Features
//!
//! - `std` (default): Standard library support
//! - `serde`: JSON/etc. serialization via serde
//! - `minicbor`: Compact binary serialization via CBOR
//! - `all`: Enable all serialization formats
//!
//! ## Example
//!
//! ```rust
//! use floorwatch_types::{MachineStatus, SourceKind, StatusClass};
//!
//! let status = MachineStatus::from_word("nominal").unwrap();
//! assert_eq!(status, MachineStatus::Running);
//! assert_eq!(status.class(), StatusClass::Running);
//!
//! let fault = MachineStatus::fault("F12");
//! assert_eq!(fault.to_string(), "F12");
//!
//! assert_eq!(SourceKind::parse("fault_code"), Some(SourceKind::FaultCode));
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**. The version is included in serialized
//! fleet snapshots to allow consumers to handle format evolution gracefully.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod event;
mod filter;
mod health;
mod machine;
mod record;
mod snapshot;
mod status;
mod version;

pub use event::*;
pub use filter::*;
pub use health::*;
pub use machine::*;
pub use record::*;
pub use snapshot::*;
pub use status::*;
pub use version::*;

/// Major schema version of exported fleet snapshots. See [`SchemaVersion`].
pub const SCHEMA_VERSION: u32 = 1;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;
