//! Cloneable handle for feeding raw events to the worker pool.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::sync::Arc;

use floorwatch_types::RawEvent;
use tokio::sync::{mpsc, oneshot};

use crate::error::IngestError;
use crate::pipeline::IngestOutcome;
use crate::pool;

/// A raw event waiting for a worker.
#[derive(Debug)]
pub(crate) struct Job {
    pub(crate) raw: RawEvent,
    pub(crate) reply: Option<oneshot::Sender<Result<IngestOutcome, IngestError>>>,
}

/// Sends raw events to the worker that owns their machine.
///
/// Obtain one from [`RunningEngine::ingestor`](crate::RunningEngine::ingestor).
/// Clones share the same workers, so producers on different tasks can each
/// hold their own.
///
/// Sending waits while the target worker's queue is full; this is the only
/// backpressure in the engine.
#[derive(Clone)]
pub struct Ingestor {
    senders: Arc<[mpsc::Sender<Job>]>,
    hasher: RandomState,
}

impl Ingestor {
    pub(crate) fn new(senders: Vec<mpsc::Sender<Job>>) -> Self {
        Self {
            senders: senders.into(),
            hasher: RandomState::new(),
        }
    }

    fn route(&self, raw: &RawEvent) -> &mpsc::Sender<Job> {
        let index = self.hasher.hash_one(raw.machine_id.trim()) as usize % self.senders.len();
        &self.senders[index]
    }

    /// Ingest an event and wait for its outcome.
    pub async fn ingest(&self, raw: RawEvent) -> Result<IngestOutcome, IngestError> {
        pool::ingest(self.route(&raw), raw).await
    }

    /// Queue an event without waiting for it to be processed.
    pub async fn submit(&self, raw: RawEvent) -> Result<(), IngestError> {
        self.route(&raw)
            .send(Job { raw, reply: None })
            .await
            .map_err(|_| IngestError::Closed)
    }

    /// Queue an event if its worker has room. Hands the event back otherwise.
    pub fn try_submit(&self, raw: RawEvent) -> Result<(), RawEvent> {
        self.route(&raw)
            .try_send(Job { raw, reply: None })
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(job) | mpsc::error::TrySendError::Closed(job) => {
                    job.raw
                }
            })
    }

    /// Number of workers behind this handle.
    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    pub fn is_closed(&self) -> bool {
        self.senders.iter().all(|tx| tx.is_closed())
    }
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("workers", &self.senders.len())
            .finish()
    }
}
