//! Async worker pool feeding the pipeline.
//!
//! Raw events are routed by machine ID so each machine is always handled by
//! the same worker, in arrival order. Different machines run in parallel.

use std::sync::Arc;

use floorwatch_types::RawEvent;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::IngestError;
use crate::handle::{Ingestor, Job};
use crate::pipeline::{IngestOutcome, Pipeline};

/// Spawn `workers` tasks and return the handle that feeds them.
pub(crate) fn spawn(
    workers: usize,
    queue_capacity: usize,
    pipeline: Arc<Pipeline>,
    clock: Arc<dyn Clock>,
    stop_rx: watch::Receiver<bool>,
) -> (Ingestor, Vec<JoinHandle<()>>) {
    let workers = workers.max(1);
    let mut senders = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);

    for id in 0..workers {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        senders.push(tx);
        handles.push(tokio::spawn(run_worker(
            id,
            rx,
            Arc::clone(&pipeline),
            Arc::clone(&clock),
            stop_rx.clone(),
        )));
    }

    info!(workers, queue_capacity, "ingestion workers started");
    (Ingestor::new(senders), handles)
}

fn handle_job(job: Job, pipeline: &Pipeline, clock: &dyn Clock) {
    let result = pipeline.process(job.raw, clock.now_ms());
    if let Some(reply) = job.reply {
        // The caller may have stopped waiting.
        let _ = reply.send(result);
    } else if let Err(err) = result {
        debug!(error = %err, "event not ingested");
    }
}

async fn run_worker(
    id: usize,
    mut rx: mpsc::Receiver<Job>,
    pipeline: Arc<Pipeline>,
    clock: Arc<dyn Clock>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            job = rx.recv() => match job {
                Some(job) => handle_job(job, &pipeline, clock.as_ref()),
                None => break,
            },
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    // Settle whatever was already queued.
                    rx.close();
                    while let Some(job) = rx.recv().await {
                        handle_job(job, &pipeline, clock.as_ref());
                    }
                    break;
                }
            }
        }
    }
    info!(worker = id, "ingestion worker stopped");
}

/// Submit a job and wait for its outcome.
pub(crate) async fn ingest(
    sender: &mpsc::Sender<Job>,
    raw: RawEvent,
) -> Result<IngestOutcome, IngestError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    sender
        .send(Job {
            raw,
            reply: Some(reply_tx),
        })
        .await
        .map_err(|_| IngestError::Closed)?;
    reply_rx.await.map_err(|_| IngestError::Closed)?
}
