//! # Data Model
//!
//! Record identifiers, shard coordinates and the counters a run produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identifier of one logical record.
///
/// Ids are assigned sequentially from a configured starting offset and never change
/// once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Little-endian two's-complement bytes; the routing hash is defined over these.
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sequential ids `start, start + 1, ...`, at most `count` of them, stopping early
/// rather than wrapping past `i64::MAX`.
pub fn record_range(start: RecordId, count: u64) -> impl Iterator<Item = RecordId> {
    (0..count).map_while(move |offset| {
        i64::try_from(offset)
            .ok()
            .and_then(|offset| start.0.checked_add(offset))
            .map(RecordId)
    })
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Physical partition that owns a record: a slot (table) inside a group (database).
///
/// Coordinates are derived from the [`RecordId`] on every access and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardCoordinate {
    pub group: u32,
    pub slot: u32,
}

impl ShardCoordinate {
    pub fn new(group: u32, slot: u32) -> Self {
        Self { group, slot }
    }
}

impl fmt::Display for ShardCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}/S{}", self.group, self.slot)
    }
}

/// Result of waiting for the replica to catch up.
///
/// Starts `Pending` and moves to exactly one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncOutcome {
    #[default]
    Pending,
    Confirmed,
    TimedOut,
}

impl SyncOutcome {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SyncOutcome::Pending)
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncOutcome::Pending => "pending",
            SyncOutcome::Confirmed => "confirmed",
            SyncOutcome::TimedOut => "timed-out",
        };
        f.write_str(label)
    }
}

/// What the replication waiter observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Lookups issued against the replica, including failed ones.
    pub attempts: u32,
    /// Lookups that failed to execute (as opposed to returning no rows).
    pub query_failures: u32,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl SyncReport {
    /// Report for a run with nothing to wait for.
    pub fn trivially_confirmed() -> Self {
        Self {
            outcome: SyncOutcome::Confirmed,
            attempts: 0,
            query_failures: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Counters produced by the write phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePhase {
    pub attempted: u64,
    pub written: u64,
    pub failed: u64,
}

/// Counters produced by the read phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPhase {
    pub confirmed: u64,
    pub missing: u64,
    pub failed: u64,
}

/// Aggregate result of one write/verify/read run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub attempted: u64,
    pub written: u64,
    pub write_failures: u64,
    pub sync: SyncReport,
    /// `None` when the read phase was skipped because the replica never caught up.
    pub confirmed: Option<u64>,
    pub read_failures: u64,
}

impl RunSummary {
    pub(crate) fn from_phases(write: WritePhase, sync: SyncReport, read: Option<ReadPhase>) -> Self {
        Self {
            attempted: write.attempted,
            written: write.written,
            write_failures: write.failed,
            sync,
            confirmed: read.map(|phase| phase.confirmed),
            read_failures: read.map(|phase| phase.failed).unwrap_or(0),
        }
    }

    /// True when the replica did not confirm the sentinel record in time.
    pub fn sync_failed(&self) -> bool {
        self.sync.outcome != SyncOutcome::Confirmed
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
