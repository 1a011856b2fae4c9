//! # floorwatch
//!
//! Command-line front end for the floorwatch engine.
//!
//! Raw telemetry arrives from an event source, is fed to a running
//! [`floorwatch_engine::Engine`], and comes back out as live status lines or
//! a fleet report.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  ┌─────────┐    ┌──────────┐    ┌──────────────┐            │
//! │  │ source  │───▶│  engine  │───▶│ subscription │──▶ stdout  │
//! │  │ (input) │    │ (workers)│    └──────────────┘            │
//! │  └─────────┘    └────┬─────┘                                │
//! │       ▲              ▼                                      │
//! │       │         ┌──────────┐                                │
//! │  File | Stream  │  report  │──▶ export file                 │
//! │  | Channel      └──────────┘                                │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`source`]**: Event source abstraction ([`EventSource`] trait) with
//!   implementations for NDJSON files, TCP streams, and in-process channels
//! - **[`report`]**: Fleet report export and terminal status lines
//! - **[`filter`]**: Command-line machine filters
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Resolve a file of events and print the resulting states
//! floorwatch --file events.ndjson
//!
//! # Tail a file, showing only faulted machines in Plant A
//! floorwatch --file events.ndjson --follow --plant "Plant A" --status fault
//!
//! # Read events from a gateway over TCP
//! floorwatch --connect localhost:9400
//!
//! # Write a fleet report and exit
//! floorwatch --file events.ndjson --export fleet.json
//! ```
//!
//! ### As a library with a channel source
//!
//! ```
//! use floorwatch::{ChannelSource, EventSource};
//! use floorwatch_engine::Engine;
//! use floorwatch_types::{RawEvent, RawPayload};
//!
//! let engine = Engine::builder().build().unwrap();
//! let (tx, mut source) = ChannelSource::create("simulator", 16);
//!
//! let now = engine.now_ms();
//! tx.try_send(RawEvent::new("1001", "sensor", now, RawPayload::status("RUNNING"))).unwrap();
//! for event in source.poll() {
//!     engine.process(event).unwrap();
//! }
//! assert_eq!(engine.len(), 1);
//! ```

pub mod filter;
pub mod report;
pub mod source;

pub use filter::FilterArgs;
pub use source::{ChannelSource, EventSource, FileSource, StreamSource};
