//! The main Engine type tying ingestion, state, and outputs together.

use std::sync::Arc;
use std::time::Duration;

use floorwatch_types::{CurrentStateRecord, FleetSnapshot, MachineId, RawEvent, StateFilter};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{ConfigError, IngestError, QueryError};
use crate::handle::Ingestor;
use crate::output::Output;
use crate::pipeline::{IngestOutcome, Pipeline};
use crate::pool;
use crate::stats::{IngestCounters, IngestStats};
use crate::store::StateStore;
use crate::subscription::{Subscription, SubscriptionHub};

/// The main entry point for resolving machine state.
///
/// An engine owns the per-machine pipeline, the current state store and the
/// subscription hub. Cloning is cheap; clones share all state.
///
/// # Example
///
/// ```rust,no_run
/// use floorwatch_engine::{Engine, Output};
/// use floorwatch_types::{RawEvent, RawPayload};
///
/// #[tokio::main]
/// async fn main() {
///     let engine = Engine::builder()
///         .output(Output::file("fleet.json"))
///         .build()
///         .unwrap();
///
///     // Start workers, the refresh sweep and snapshot emission
///     let running = engine.start();
///
///     running
///         .ingest(RawEvent::new("1001", "fault_code", "2026-10-17T10:00:00Z", RawPayload::code("F12")))
///         .await
///         .unwrap();
///
///     running.shutdown().await;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<EngineConfig>,
    clock: Arc<dyn Clock>,
    pipeline: Arc<Pipeline>,
    store: Arc<StateStore>,
    stats: Arc<IngestStats>,
    outputs: Arc<Vec<Output>>,
}

impl Engine {
    /// Create a builder for configuring the engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Process one raw event on the caller's thread.
    pub fn process(&self, raw: RawEvent) -> Result<IngestOutcome, IngestError> {
        self.pipeline.process(raw, self.clock.now_ms())
    }

    /// Latest record for a machine.
    pub fn get(&self, id: &MachineId) -> Result<Arc<CurrentStateRecord>, QueryError> {
        self.store.get(id)
    }

    /// Subscribe to updates for machines matching `filter`.
    ///
    /// The current record of every matching machine is delivered first.
    pub fn subscribe(&self, filter: StateFilter) -> Subscription {
        self.store.subscribe(filter, self.clock.now_ms())
    }

    /// Re-resolve every machine against the clock. Returns records written.
    pub fn refresh(&self) -> usize {
        self.pipeline.refresh(self.clock.now_ms())
    }

    /// Collect a snapshot of every current record.
    pub fn collect(&self) -> FleetSnapshot {
        self.store.snapshot(self.clock.now_ms())
    }

    pub fn stats(&self) -> IngestCounters {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Number of machines with a current record.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Emit a snapshot to all outputs immediately.
    pub async fn emit_now(&self) {
        emit(&self.outputs, &self.collect()).await;
    }

    /// Start ingestion workers and background tasks.
    ///
    /// This spawns the worker pool plus one task that periodically runs the
    /// refresh sweep and emits snapshots to all configured outputs. Must be
    /// called from within a tokio runtime.
    pub fn start(&self) -> RunningEngine {
        let (stop_tx, stop_rx) = watch::channel(false);
        let pipeline_config = &self.config.pipeline;
        let (ingestor, workers) = pool::spawn(
            pipeline_config.workers,
            pipeline_config.queue_capacity,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.clock),
            stop_rx.clone(),
        );

        let engine = self.clone();
        let refresh_every = self.config.engine.refresh_interval;
        let emit_every = self.config.engine.emit_interval;
        let background = tokio::spawn(async move {
            let mut refresh_timer = tokio::time::interval(refresh_every);
            let mut emit_timer = tokio::time::interval(emit_every);
            let mut stop_rx = stop_rx;

            loop {
                tokio::select! {
                    _ = refresh_timer.tick() => {
                        let written = engine.refresh();
                        if written > 0 {
                            debug!(written, "refresh sweep committed records");
                        }
                    }
                    _ = emit_timer.tick() => {
                        engine.emit_now().await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        info!(
            workers = pipeline_config.workers,
            refresh = ?refresh_every,
            emit = ?emit_every,
            outputs = self.outputs.len(),
            "engine started"
        );

        RunningEngine {
            engine: self.clone(),
            ingestor,
            stop_tx,
            workers,
            background,
        }
    }
}

async fn emit(outputs: &[Output], snapshot: &FleetSnapshot) {
    for output in outputs {
        if let Err(err) = output.emit(snapshot).await {
            debug!(error = %err, ?output, "snapshot emission failed");
        }
    }
}

/// Builder for configuring an Engine.
#[derive(Debug, Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    clock: Option<Arc<dyn Clock>>,
    outputs: Vec<Output>,
}

impl EngineBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration instead of the defaults.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Read "now" from this clock. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Add an output destination.
    ///
    /// Multiple outputs can be added; snapshots will be emitted to all of them.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Validate the configuration and build the engine.
    pub fn build(self) -> Result<Engine, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let hub = Arc::new(SubscriptionHub::new(config.subscriptions.buffer));
        let store = Arc::new(StateStore::new(
            config.store.shards,
            config.store.contention_timeout,
            hub,
        ));
        let stats = Arc::new(IngestStats::default());
        let pipeline = Arc::new(Pipeline::new(&config, Arc::clone(&store), Arc::clone(&stats)));

        Ok(Engine {
            config: Arc::new(config),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            pipeline,
            store,
            stats,
            outputs: Arc::new(self.outputs),
        })
    }
}

/// A started engine: workers and background tasks are running.
///
/// Drop this handle to stop everything, or call `shutdown()` to wait for
/// queued events to settle.
#[derive(Debug)]
pub struct RunningEngine {
    engine: Engine,
    ingestor: Ingestor,
    stop_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
    background: JoinHandle<()>,
}

impl RunningEngine {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// A cloneable handle for producers.
    pub fn ingestor(&self) -> Ingestor {
        self.ingestor.clone()
    }

    /// Ingest an event through the worker pool and wait for its outcome.
    pub async fn ingest(&self, raw: RawEvent) -> Result<IngestOutcome, IngestError> {
        self.ingestor.ingest(raw).await
    }

    /// Stop accepting events, settle everything queued, stop background
    /// tasks and emit one final snapshot. Returns the engine for queries.
    pub async fn shutdown(self) -> Engine {
        let _ = self.stop_tx.send(true);
        for worker in self.workers {
            let _ = worker.await;
        }
        let _ = self.background.await;

        self.engine.refresh();
        self.engine.emit_now().await;
        info!(stats = ?self.engine.stats(), "engine stopped");
        self.engine
    }

    /// Wait this long, then shut down.
    pub async fn shutdown_after(self, delay: Duration) -> Engine {
        tokio::time::sleep(delay).await;
        self.shutdown().await
    }
}
