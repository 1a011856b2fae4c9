//! Stream-based event source.
//!
//! Receives raw events from an async byte stream.
//! This is useful for network-based sources like TCP connections
//! or gateway bridges.

use floorwatch_types::RawEvent;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

use super::{parse_line, EventSource};

/// What the background reader hands to `poll()`.
#[derive(Debug)]
enum Message {
    Event(RawEvent),
    Error(String),
}

/// An event source that receives raw events from an async stream.
///
/// This source spawns a background task that reads newline-delimited JSON
/// from the provided async reader and makes events available via `poll()`.
///
/// # Example with a byte stream
///
/// ```
/// use std::io::Cursor;
/// use floorwatch::StreamSource;
///
/// # tokio_test::block_on(async {
/// let data = concat!(
///     r#"{"machine_id":"1001","source":"sensor","timestamp":1,"payload":{"status":"RUNNING"}}"#,
///     "\n"
/// );
/// let stream = Cursor::new(data.as_bytes().to_vec());
/// let source = StreamSource::spawn(stream, "example");
/// # });
/// ```
#[derive(Debug)]
pub struct StreamSource {
    receiver: mpsc::Receiver<Message>,
    description: String,
    last_error: Option<String>,
    closed: bool,
}

impl StreamSource {
    /// Spawn a background task that reads from the given async reader.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<R>(reader: R, description: &str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut line = String::new();

            loop {
                line.clear();
                let message = match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match parse_line(&line) {
                        Ok(Some(event)) => Message::Event(event),
                        Ok(None) => continue,
                        Err(e) => Message::Error(e),
                    },
                    Err(e) => {
                        let _ = tx.send(Message::Error(format!("Read error: {}", e))).await;
                        break;
                    }
                };
                if tx.send(message).await.is_err() {
                    // Receiver dropped
                    break;
                }
            }
        });

        Self::from_receiver(rx, description)
    }

    /// Create a StreamSource from a channel of raw JSON payloads.
    ///
    /// Each message is one serialized [`RawEvent`]; useful when another
    /// transport already frames the messages.
    pub fn from_bytes_channel(mut rx: mpsc::Receiver<Vec<u8>>, description: &str) -> Self {
        let (tx, event_rx) = mpsc::channel(256);

        tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                let message = match serde_json::from_slice::<RawEvent>(&bytes) {
                    Ok(event) => Message::Event(event),
                    Err(e) => Message::Error(format!("Parse error: {}", e)),
                };
                if tx.send(message).await.is_err() {
                    break;
                }
            }
        });

        Self::from_receiver(event_rx, description)
    }

    fn from_receiver(receiver: mpsc::Receiver<Message>, description: &str) -> Self {
        Self {
            receiver,
            description: format!("stream: {}", description),
            last_error: None,
            closed: false,
        }
    }
}

impl EventSource for StreamSource {
    fn poll(&mut self) -> Vec<RawEvent> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(Message::Event(event)) => events.push(event),
                Ok(Message::Error(e)) => self.last_error = Some(e),
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
        self.last_error.as_deref()
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
