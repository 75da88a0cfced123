//! Default constants for shardsync configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Layout Defaults
// =============================================================================

/// Default number of partition groups (databases)
pub const DEFAULT_GROUPS: u32 = 8;

/// Default number of slots (tables) per group
/// 8 groups x 8 slots gives 64 partitions.
pub const DEFAULT_SLOTS_PER_GROUP: u32 = 8;

/// Default database name prefix; group `g` lives in `user_<g>`
pub const DEFAULT_DATABASE_PREFIX: &str = "user_";

/// Default table name prefix; slot `s` is table `user_info_<s>`
pub const DEFAULT_TABLE_PREFIX: &str = "user_info_";

// =============================================================================
// Run Defaults
// =============================================================================

/// First record id written by a run
pub const DEFAULT_START_ID: i64 = 100_000_000;

/// Number of sequential records written by a run
pub const DEFAULT_RECORD_COUNT: u64 = 1_000;

// =============================================================================
// Replication Wait Defaults
// =============================================================================

/// Lookups issued against the replica before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Delay between replica lookups (milliseconds)
/// With the default attempt count the wait is bounded by 3 seconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

// =============================================================================
// Simulation Defaults
// =============================================================================

/// Propagation delay of the in-memory replica (milliseconds)
pub const DEFAULT_REPLICATION_LAG_MS: u64 = 50;
