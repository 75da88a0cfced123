//! Error types for the storage seam and for runs.

use thiserror::Error;

use crate::model::ShardCoordinate;

/// Failure reported by a primary or replica collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("unknown partition {0}")]
    UnknownPartition(ShardCoordinate),

    #[error("statement failed: {0}")]
    Statement(String),
}

/// Which collaborator a start-up failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Primary,
    Replica,
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreRole::Primary => f.write_str("primary"),
            StoreRole::Replica => f.write_str("replica"),
        }
    }
}

/// Errors that abort a run. Per-record failures never surface here.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("cannot reach {role}: {source}")]
    Startup {
        role: StoreRole,
        #[source]
        source: StoreError,
    },

    #[error("schema bootstrap failed on `{statement}`: {source}")]
    Schema {
        statement: String,
        #[source]
        source: StoreError,
    },

    #[error("invalid shard layout: {0}")]
    Layout(String),

    #[error("invalid record range: {0}")]
    Range(String),

    #[error("replication waiter stopped before reporting")]
    WaiterLost,
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
