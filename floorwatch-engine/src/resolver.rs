//! Precedence resolution over the latest signal per source kind.

use floorwatch_types::{MachineStatus, Signal, SignalSnapshot, SourceKind, TimestampMs};

use crate::config::{PrecedenceConfig, StalenessConfig};

/// The latest status-bearing signal retained for one source kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEntry {
    pub signal: Signal,
    pub timestamp_ms: TimestampMs,
    pub dedup_key: String,
    pub reference: Option<String>,
}

impl SignalEntry {
    /// True if `self` should replace `stored`.
    ///
    /// Newer event time wins; equal times fall back to the dedup key so
    /// every arrival order converges on the same entry. An identical key
    /// never supersedes.
    fn supersedes(&self, stored: &SignalEntry) -> bool {
        self.timestamp_ms > stored.timestamp_ms
            || (self.timestamp_ms == stored.timestamp_ms && self.dedup_key > stored.dedup_key)
    }

    fn same_event(&self, stored: &SignalEntry) -> bool {
        self.timestamp_ms == stored.timestamp_ms && self.dedup_key == stored.dedup_key
    }
}

/// Result of offering an entry to a [`SignalTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Applied,
    /// Older than the retained entry for the same kind.
    Stale,
    /// The retained entry is this same event.
    Duplicate,
}

/// Latest entry per source kind for one machine.
#[derive(Debug, Clone, Default)]
pub struct SignalTable {
    entries: [Option<SignalEntry>; SourceKind::COUNT],
    generation: u64,
}

impl SignalTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a new entry for `kind`, keeping it only if it supersedes the
    /// retained one.
    pub fn offer(&mut self, kind: SourceKind, entry: SignalEntry) -> Offer {
        let slot = &mut self.entries[kind.index()];
        if let Some(stored) = slot {
            if entry.same_event(stored) {
                return Offer::Duplicate;
            }
            if !entry.supersedes(stored) {
                return Offer::Stale;
            }
        }
        *slot = Some(entry);
        self.generation += 1;
        Offer::Applied
    }

    pub fn get(&self, kind: SourceKind) -> Option<&SignalEntry> {
        self.entries[kind.index()].as_ref()
    }

    /// Incremented on every applied offer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn iter(&self) -> impl Iterator<Item = (SourceKind, &SignalEntry)> {
        SourceKind::ALL
            .into_iter()
            .filter_map(|kind| self.get(kind).map(|entry| (kind, entry)))
    }
}

/// Outcome of resolving a [`SignalTable`] at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub status: MachineStatus,
    /// Kind whose entry won, `None` when the status is `Unknown`.
    pub source: Option<SourceKind>,
    pub generation: u64,
}

/// Picks the current status from a signal table.
///
/// Resolution is a pure function of the table, the rules, and `now`.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    precedence: PrecedenceConfig,
    staleness: StalenessConfig,
}

impl Resolver {
    pub fn new(precedence: PrecedenceConfig, staleness: StalenessConfig) -> Self {
        Self {
            precedence,
            staleness,
        }
    }

    /// True once an entry is older than its kind's staleness window.
    pub fn is_expired(&self, kind: SourceKind, timestamp_ms: TimestampMs, now_ms: TimestampMs) -> bool {
        self.staleness
            .window_ms(kind)
            .is_some_and(|window| now_ms.saturating_sub(timestamp_ms) > window)
    }

    /// Highest (rank, timestamp, kind) among live asserting entries.
    pub fn resolve(&self, table: &SignalTable, now_ms: TimestampMs) -> Resolution {
        let winner = table
            .iter()
            .filter(|(kind, entry)| !self.is_expired(*kind, entry.timestamp_ms, now_ms))
            .filter_map(|(kind, entry)| {
                let status = entry.signal.status()?;
                let rank = self.precedence.rank(kind)?;
                Some(((rank, entry.timestamp_ms, kind.index()), kind, status))
            })
            .max_by_key(|(key, _, _)| *key);

        match winner {
            Some((_, kind, status)) => Resolution {
                status: status.clone(),
                source: Some(kind),
                generation: table.generation(),
            },
            None => Resolution {
                status: MachineStatus::Unknown,
                source: None,
                generation: table.generation(),
            },
        }
    }

    /// Per-kind view of the table for the current state record.
    pub fn snapshots(&self, table: &SignalTable, now_ms: TimestampMs) -> Vec<SignalSnapshot> {
        table
            .iter()
            .map(|(kind, entry)| SignalSnapshot {
                kind,
                signal: entry.signal.clone(),
                timestamp_ms: entry.timestamp_ms,
                dedup_key: entry.dedup_key.clone(),
                reference: entry.reference.clone(),
                expired: self.is_expired(kind, entry.timestamp_ms, now_ms),
            })
            .collect()
    }
}
