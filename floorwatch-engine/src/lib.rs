//! # floorwatch-engine
//!
//! Real-time status and health resolution for factory equipment.
//!
//! Raw telemetry from sensors, operator overrides, maintenance flags and
//! fault codes is normalized, resolved into a single current status per
//! machine by configurable precedence, scored for health over a rolling
//! window, and published as versioned records to point queries and push
//! subscribers.
//!
//! ## Quick Start
//!
//! ```rust
//! use floorwatch_engine::{Engine, ManualClock};
//! use floorwatch_types::{MachineId, RawEvent, RawPayload};
//! use std::sync::Arc;
//!
//! let clock = Arc::new(ManualClock::new(3));
//! let engine = Engine::builder().clock(clock.clone()).build().unwrap();
//!
//! engine.process(RawEvent::new("1001", "sensor", 1u64, RawPayload::status("NOMINAL"))).unwrap();
//! engine.process(RawEvent::new("1001", "fault_code", 2u64, RawPayload::code("F12"))).unwrap();
//! engine.process(RawEvent::new("1001", "operator_override", 3u64, RawPayload::status("RUNNING"))).unwrap();
//!
//! let record = engine.get(&MachineId::from("1001")).unwrap();
//! assert_eq!(record.status.to_string(), "F12");
//!
//! // Once the fault code ages out, the operator override wins.
//! clock.advance(31 * 60 * 1000);
//! engine.refresh();
//! let record = engine.get(&MachineId::from("1001")).unwrap();
//! assert_eq!(record.status.to_string(), "Running");
//! ```
//!
//! ## Features
//!
//! - **Precedence resolution**: Latest signal per source kind, ranked by config
//! - **Rolling health**: Bucketed window, bounded memory per machine
//! - **Versioned records**: Strictly increasing version per machine
//! - **Subscriptions**: Bounded, coalescing queues that never block producers
//! - **Multiple outputs**: File, TCP, or custom channel

mod clock;
mod config;
mod dedup;
mod duration;
mod engine;
mod error;
mod handle;
mod health;
mod normalizer;
mod output;
mod pipeline;
mod pool;
mod resolver;
mod stats;
mod store;
mod subscription;
mod work_orders;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    EngineConfig, HealthConfig, PipelineConfig, PrecedenceConfig, ScheduleConfig,
    StalenessConfig, StoreConfig, SubscriptionConfig,
};
pub use dedup::DedupWindow;
pub use duration::{format_duration, parse_duration};
pub use engine::{Engine, EngineBuilder, RunningEngine};
pub use error::{ConfigError, IngestError, MalformedEventError, QueryError, StoreError};
pub use handle::Ingestor;
pub use health::{HealthCalculator, HealthWindow, Observation};
pub use normalizer::{parse_timestamp, Normalizer};
pub use output::Output;
pub use pipeline::{IngestOutcome, Pipeline};
pub use resolver::{Offer, Resolution, Resolver, SignalEntry, SignalTable};
pub use stats::{IngestCounters, IngestStats};
pub use store::{StateStore, StateUpdate};
pub use subscription::{Subscription, SubscriptionHub};
pub use work_orders::WorkOrders;

// Re-export types for convenience
pub use floorwatch_types::{
    CurrentStateRecord, FleetSnapshot, FleetSummary, MachineId, MachineStatus, RawEvent,
    RawPayload, StateFilter,
};
