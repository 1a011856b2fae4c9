//! Channel-based event source.
//!
//! Receives raw events via a tokio mpsc channel, for producers that live
//! in the same process (gateway bridges, simulators, tests).

use floorwatch_types::RawEvent;
use tokio::sync::mpsc;

use super::EventSource;

/// An event source fed by an in-process channel.
///
/// # Example
///
/// ```
/// use floorwatch::{ChannelSource, EventSource};
/// use floorwatch_types::{RawEvent, RawPayload};
///
/// let (tx, mut source) = ChannelSource::create("plc-gateway", 64);
/// tx.try_send(RawEvent::new("1001", "sensor", 1u64, RawPayload::status("RUNNING"))).unwrap();
/// assert_eq!(source.poll().len(), 1);
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    receiver: mpsc::Receiver<RawEvent>,
    description: String,
    closed: bool,
}

impl ChannelSource {
    /// Create a new channel source.
    ///
    /// # Arguments
    ///
    /// * `receiver` - The receiving end of an mpsc channel
    /// * `source_description` - Where events come from (e.g., "opc-ua://line-3")
    pub fn new(receiver: mpsc::Receiver<RawEvent>, source_description: &str) -> Self {
        Self {
            receiver,
            description: format!("channel: {}", source_description),
            closed: false,
        }
    }

    /// Create a channel pair; the sender pushes events into the source.
    pub fn create(source_description: &str, buffer: usize) -> (mpsc::Sender<RawEvent>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self::new(rx, source_description))
    }
}

impl EventSource for ChannelSource {
    fn poll(&mut self) -> Vec<RawEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        events
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn error(&self) -> Option<&str> {
        // Events arrive already parsed
        None
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
