//! Error types for ingestion, queries, the state store, and configuration.

use floorwatch_types::{MachineId, SourceKind};
use thiserror::Error;

/// A raw event that failed validation. Dropped and counted, never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedEventError {
    #[error("machine id is empty")]
    EmptyMachineId,

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("unknown source kind: {0}")]
    UnknownSourceKind(String),

    /// A valid kind that the precedence table does not rank.
    #[error("source kind not configured: {0}")]
    UnconfiguredSourceKind(SourceKind),

    #[error("payload does not fit source kind {kind}: {reason}")]
    PayloadShape { kind: SourceKind, reason: &'static str },

    #[error("unknown status word for {kind}: {word}")]
    UnknownStatus { kind: SourceKind, word: String },

    #[error("sensor reading is not a finite number")]
    InvalidReading,
}

/// Errors from the current state store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The per-machine critical section could not be entered in time.
    /// Retryable.
    #[error("timed out waiting for the state of machine {0}")]
    ContentionTimeout(MachineId),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ContentionTimeout(_))
    }
}

/// Errors returned to query callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("machine {0} has never been observed")]
    UnknownMachine(MachineId),
}

/// Errors surfaced by the ingestion path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error(transparent)]
    Malformed(#[from] MalformedEventError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The worker pool has shut down.
    #[error("ingestion is closed")]
    Closed,
}

impl IngestError {
    /// Retrying the same event may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::Store(err) => err.is_retryable(),
            IngestError::Malformed(_) | IngestError::Closed => false,
        }
    }
}

/// Errors loading or validating engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid duration {value:?}: {reason}")]
    Duration { value: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
