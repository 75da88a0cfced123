//! Unified configuration for shardsync runs.
//!
//! Configuration is loaded with precedence: CLI args > Env vars > Config file > Defaults
//!
//! # Example config file (shardsync.toml)
//! ```toml
//! [layout]
//! groups = 8
//! slots_per_group = 8
//!
//! [run]
//! start_id = 100000000
//! record_count = 1000
//!
//! [replication]
//! max_attempts = 30
//! retry_delay_ms = 100
//! ```
//!
//! Environment variables use the `SHARDSYNC_` prefix with `__` between section and
//! key, e.g. `SHARDSYNC_REPLICATION__MAX_ATTEMPTS=10`.

mod defaults;

pub use defaults::*;

use crate::error::SyncError;
use crate::memory::ReplicaMode;
use crate::model::RecordId;
use crate::orchestrator::RunPlan;
use crate::replication::RetryPolicy;
use crate::sharding::ShardLayout;
use crate::statement::{ShardNaming, WriteMode};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a shardsync run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShardSyncConfig {
    /// Partition topology and naming
    pub layout: LayoutConfig,
    /// Record range and write behaviour
    pub run: RunConfig,
    /// Replica wait budget
    pub replication: ReplicationConfig,
    /// In-memory collaborator used by the runner
    pub simulation: SimulationConfig,
}

impl ShardSyncConfig {
    /// Load configuration with precedence: CLI args > Env > File > Defaults
    ///
    /// # Arguments
    /// * `config_path` - Optional path to TOML config file
    /// * `overrides` - CLI overrides to apply on top
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let mut figment = Figment::new().merge(Serialized::defaults(ShardSyncConfig::default()));

        // Layer 1: Config file (if provided)
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 2: Environment variables with SHARDSYNC_ prefix
        figment = figment.merge(Env::prefixed("SHARDSYNC_").split("__"));

        // Layer 3: CLI overrides
        figment = figment.merge(Serialized::defaults(overrides));

        figment.extract().map_err(ConfigError::from)
    }

    /// Load from environment and optional config file only (no CLI overrides)
    pub fn from_env(config_path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load(config_path, ConfigOverrides::default())
    }

    /// Validate the scalar settings into the plan a run executes.
    pub fn plan(&self) -> Result<RunPlan, SyncError> {
        let layout = ShardLayout::new(self.layout.groups, self.layout.slots_per_group)?;
        RunPlan::new(
            layout,
            RecordId(self.run.start_id),
            self.run.record_count,
        )
        .map(|plan| {
            plan.with_naming(ShardNaming {
                database_prefix: self.layout.database_prefix.clone(),
                table_prefix: self.layout.table_prefix.clone(),
            })
            .with_write_mode(self.run.write_mode)
            .with_bootstrap(self.run.bootstrap_schema)
            .with_retry_policy(self.replication.retry_policy())
        })
    }
}

/// Partition topology.
///
/// Changing `groups` or `slots_per_group` re-routes almost every record; existing data
/// is not moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Number of partition groups (databases)
    pub groups: u32,
    /// Number of slots (tables) in each group
    pub slots_per_group: u32,
    /// Database name prefix
    pub database_prefix: String,
    /// Table name prefix
    pub table_prefix: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            groups: DEFAULT_GROUPS,
            slots_per_group: DEFAULT_SLOTS_PER_GROUP,
            database_prefix: DEFAULT_DATABASE_PREFIX.to_string(),
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
        }
    }
}

/// Record range and write behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// First record id
    pub start_id: i64,
    /// Number of sequential records
    pub record_count: u64,
    /// Plain insert or upsert
    pub write_mode: WriteMode,
    /// Create databases and tables before writing
    pub bootstrap_schema: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            start_id: DEFAULT_START_ID,
            record_count: DEFAULT_RECORD_COUNT,
            write_mode: WriteMode::Insert,
            bootstrap_schema: true,
        }
    }
}

/// Replica wait budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Lookups before giving up
    pub max_attempts: u32,
    /// Delay between lookups in milliseconds
    pub retry_delay_ms: u64,
}

impl ReplicationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Behaviour of the in-memory primary/replica pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Propagation delay in milliseconds
    pub replication_lag_ms: u64,
    /// Never replicate anything
    pub stalled: bool,
}

impl SimulationConfig {
    pub fn replica_mode(&self) -> ReplicaMode {
        if self.stalled {
            ReplicaMode::Stalled
        } else {
            ReplicaMode::Lagging(Duration::from_millis(self.replication_lag_ms))
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            replication_lag_ms: DEFAULT_REPLICATION_LAG_MS,
            stalled: false,
        }
    }
}

/// CLI overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationOverrides>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slots_per_group: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_mode: Option<WriteMode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replication_lag_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stalled: Option<bool>,
}

/// Configuration error.
#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self {
            message: e.to_string(),
        }
    }
}
