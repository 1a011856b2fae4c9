//! Event source abstraction for receiving raw telemetry.
//!
//! This module provides a trait-based abstraction for receiving raw events
//! from various sources (NDJSON files, network streams, in-memory channels).

mod channel;
mod file;
mod stream;

pub use channel::ChannelSource;
pub use file::FileSource;
pub use stream::StreamSource;

use std::fmt::Debug;

use floorwatch_types::RawEvent;

/// Trait for receiving raw events from various sources.
///
/// Implementations hand out whatever events arrived since the last poll.
/// Lines that cannot be parsed are skipped and reported through
/// [`error`](EventSource::error); they never reach the engine.
///
/// # Example
///
/// ```
/// use floorwatch::{EventSource, FileSource};
///
/// let mut source = FileSource::new("events.ndjson");
/// for event in source.poll() {
///     println!("{} from {}", event.machine_id, event.source);
/// }
/// ```
pub trait EventSource: Send + Debug {
    /// Take the events that arrived since the last poll.
    ///
    /// Returns an empty vector if nothing new is available.
    /// This method should be non-blocking.
    fn poll(&mut self) -> Vec<RawEvent>;

    /// Returns a human-readable description of the source.
    fn description(&self) -> &str;

    /// The most recent read or parse error, if any.
    fn error(&self) -> Option<&str>;

    /// True once the source can never produce another event.
    fn is_closed(&self) -> bool {
        false
    }
}

/// Parse one NDJSON line. Blank lines yield `Ok(None)`.
pub(crate) fn parse_line(line: &str) -> Result<Option<RawEvent>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| format!("Parse error: {}", e))
}
