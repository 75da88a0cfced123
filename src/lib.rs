//! # Shardsync
//!
//! Deterministic shard routing with replica catch-up verification.
//!
//! Records identified by a 64-bit id are spread over `groups × slots_per_group`
//! partitions by a CRC-32 of the id. A run writes a range of ids through the primary,
//! polls the replica until the last id shows up, and only then reads the range back
//! from the replica. Storage is reached through the [`PrimaryExecutor`] and
//! [`ReplicaQuery`] traits; [`memory::MemoryCluster`] provides an in-process pair.

pub mod config;
pub mod error;
pub mod memory;
pub mod model;
pub mod orchestrator;
pub mod replication;
pub mod sharding;
pub mod statement;
pub mod store;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigOverrides, ShardSyncConfig};
pub use error::{StoreError, StoreRole, SyncError};
pub use model::{
    record_range, ReadPhase, RecordId, RunSummary, ShardCoordinate, SyncOutcome, SyncReport,
    WritePhase,
};
pub use orchestrator::{Orchestrator, RunPlan};
pub use replication::{await_replication, spawn_waiter, ReplicationHandle, RetryPolicy};
pub use sharding::{record_hash, route, shard_histogram, ShardLayout};
pub use statement::{ShardNaming, Statement, StatementBuilder, StatementKind, WriteMode};
pub use store::{PrimaryExecutor, ReplicaQuery, Rows};
