//! In-process primary/replica pair.
//!
//! Writes commit on the primary and are appended to an ordered replication log. The
//! replica applies that log strictly in order, each entry once the configured lag has
//! passed since its commit, which gives the ordered-replication guarantee the sentinel
//! check relies on. Schema statements apply to both sides immediately.
//!
//! Fault injection hooks make the failure paths of a run reproducible.

use crate::error::StoreError;
use crate::model::{RecordId, ShardCoordinate};
use crate::sharding::ShardLayout;
use crate::statement::{Statement, StatementKind, WriteMode};
use crate::store::{PrimaryExecutor, ReplicaQuery, Rows};
use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// How the replica follows the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaMode {
    /// Entries become visible `lag` after they commit.
    Lagging(Duration),
    /// Replication is stopped; nothing new ever becomes visible.
    Stalled,
}

impl Default for ReplicaMode {
    fn default() -> Self {
        ReplicaMode::Lagging(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Copy)]
struct LogEntry {
    coordinate: ShardCoordinate,
    id: RecordId,
    committed_at: Instant,
}

#[derive(Debug, Default)]
struct ClusterState {
    databases: HashSet<u32>,
    primary: HashMap<ShardCoordinate, BTreeSet<RecordId>>,
    replica: HashMap<ShardCoordinate, BTreeSet<RecordId>>,
    log: VecDeque<LogEntry>,
    mode: ReplicaMode,
    failing_writes: HashSet<RecordId>,
    failing_queries: u32,
    primary_down: bool,
    replica_down: bool,
    executed: u64,
    queries: u64,
}

impl ClusterState {
    fn catch_up(&mut self, now: Instant) {
        let lag = match self.mode {
            ReplicaMode::Lagging(lag) => lag,
            ReplicaMode::Stalled => return,
        };
        while let Some(entry) = self.log.front() {
            if entry.committed_at + lag > now {
                break;
            }
            let LogEntry { coordinate, id, .. } = *entry;
            self.log.pop_front();
            self.replica.entry(coordinate).or_default().insert(id);
        }
    }

    fn create_partition(&mut self, coordinate: ShardCoordinate) {
        self.databases.insert(coordinate.group);
        self.primary.entry(coordinate).or_default();
        self.replica.entry(coordinate).or_default();
    }
}

/// Shared handle to an in-memory primary/replica pair.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    pub fn new(mode: ReplicaMode) -> Self {
        let state = ClusterState {
            mode,
            ..ClusterState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Create every partition of `layout` on both sides without going through SQL.
    pub fn with_partitions(self, layout: &ShardLayout) -> Self {
        {
            let mut state = self.state.lock();
            for coordinate in layout.coordinates() {
                state.create_partition(coordinate);
            }
        }
        self
    }

    pub fn primary(&self) -> MemoryPrimary {
        MemoryPrimary {
            cluster: self.clone(),
        }
    }

    pub fn replica(&self) -> MemoryReplica {
        MemoryReplica {
            cluster: self.clone(),
        }
    }

    pub fn set_replica_mode(&self, mode: ReplicaMode) {
        self.state.lock().mode = mode;
    }

    /// Make every write of the given ids fail.
    pub fn fail_writes_for(&self, ids: impl IntoIterator<Item = RecordId>) {
        self.state.lock().failing_writes.extend(ids);
    }

    /// Make the next `count` replica lookups fail to execute.
    pub fn fail_next_queries(&self, count: u32) {
        self.state.lock().failing_queries = count;
    }

    pub fn set_primary_reachable(&self, reachable: bool) {
        self.state.lock().primary_down = !reachable;
    }

    pub fn set_replica_reachable(&self, reachable: bool) {
        self.state.lock().replica_down = !reachable;
    }

    /// Statements the primary accepted for execution, successful or not.
    pub fn executed_statements(&self) -> u64 {
        self.state.lock().executed
    }

    /// Lookups the replica accepted for execution, successful or not.
    pub fn replica_queries(&self) -> u64 {
        self.state.lock().queries
    }

    pub fn primary_len(&self) -> usize {
        self.state.lock().primary.values().map(BTreeSet::len).sum()
    }

    pub fn replica_len(&self) -> usize {
        let mut state = self.state.lock();
        state.catch_up(Instant::now());
        state.replica.values().map(BTreeSet::len).sum()
    }

    pub fn partition_count(&self) -> usize {
        self.state.lock().primary.len()
    }

    /// Committed writes the replica has not applied yet.
    pub fn pending_replication(&self) -> usize {
        self.state.lock().log.len()
    }

    fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        let mut state = self.state.lock();
        if state.primary_down {
            return Err(StoreError::Unreachable("primary is down".to_string()));
        }
        state.executed += 1;
        match statement.kind {
            StatementKind::CreateDatabase { group } => {
                Ok(u64::from(state.databases.insert(group)))
            }
            StatementKind::CreateTable { coordinate } => {
                if !state.databases.contains(&coordinate.group) {
                    return Err(StoreError::Statement(format!(
                        "database for {coordinate} does not exist"
                    )));
                }
                state.create_partition(coordinate);
                Ok(0)
            }
            StatementKind::Insert {
                coordinate,
                id,
                mode,
            } => {
                if state.failing_writes.contains(&id) {
                    return Err(StoreError::Statement(format!("injected failure for {id}")));
                }
                let rows = state
                    .primary
                    .get_mut(&coordinate)
                    .ok_or(StoreError::UnknownPartition(coordinate))?;
                if !rows.insert(id) {
                    return match mode {
                        WriteMode::Insert => Err(StoreError::Constraint(format!(
                            "duplicate entry {id} in {coordinate}"
                        ))),
                        WriteMode::Upsert => Ok(0),
                    };
                }
                state.log.push_back(LogEntry {
                    coordinate,
                    id,
                    committed_at: Instant::now(),
                });
                Ok(1)
            }
            StatementKind::PointLookup { .. } => Err(StoreError::Statement(
                "lookups are not executed on the primary".to_string(),
            )),
        }
    }

    fn query(&self, statement: &Statement) -> Result<Rows, StoreError> {
        let mut state = self.state.lock();
        if state.replica_down {
            return Err(StoreError::Unreachable("replica is down".to_string()));
        }
        state.queries += 1;
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(StoreError::Statement("injected query failure".to_string()));
        }
        let StatementKind::PointLookup { coordinate, id } = statement.kind else {
            return Err(StoreError::Statement(format!(
                "replica only serves lookups, got `{statement}`"
            )));
        };
        state.catch_up(Instant::now());
        let rows = state
            .replica
            .get(&coordinate)
            .ok_or(StoreError::UnknownPartition(coordinate))?;
        if rows.contains(&id) {
            Ok(Rows::new(vec![id]))
        } else {
            Ok(Rows::empty())
        }
    }
}

/// Primary side of a [`MemoryCluster`].
#[derive(Debug, Clone)]
pub struct MemoryPrimary {
    cluster: MemoryCluster,
}

#[async_trait]
impl PrimaryExecutor for MemoryPrimary {
    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        self.cluster.execute(statement)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.cluster.state.lock().primary_down {
            return Err(StoreError::Unreachable("primary is down".to_string()));
        }
        Ok(())
    }
}

/// Replica side of a [`MemoryCluster`].
#[derive(Debug, Clone)]
pub struct MemoryReplica {
    cluster: MemoryCluster,
}

#[async_trait]
impl ReplicaQuery for MemoryReplica {
    async fn query(&self, statement: &Statement) -> Result<Rows, StoreError> {
        self.cluster.query(statement)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.cluster.state.lock().replica_down {
            return Err(StoreError::Unreachable("replica is down".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementBuilder;

    fn layout() -> ShardLayout {
        ShardLayout::new(2, 2).unwrap()
    }

    #[tokio::test]
    async fn insert_then_lookup_without_lag() {
        let layout = layout();
        let cluster = MemoryCluster::new(ReplicaMode::default()).with_partitions(&layout);
        let builder = StatementBuilder::default();
        let id = RecordId(7);
        let coordinate = layout.route(id);

        let affected = cluster
            .primary()
            .execute(&builder.insert(coordinate, id, WriteMode::Insert))
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = cluster
            .replica()
            .query(&builder.point_lookup(coordinate, id))
            .await
            .unwrap();
        assert_eq!(rows.ids(), &[id]);
    }

    #[tokio::test]
    async fn duplicate_insert_violates_constraint_but_upsert_succeeds() {
        let layout = layout();
        let cluster = MemoryCluster::new(ReplicaMode::default()).with_partitions(&layout);
        let builder = StatementBuilder::default();
        let id = RecordId(11);
        let coordinate = layout.route(id);
        let primary = cluster.primary();

        primary
            .execute(&builder.insert(coordinate, id, WriteMode::Insert))
            .await
            .unwrap();
        let err = primary
            .execute(&builder.insert(coordinate, id, WriteMode::Insert))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        let affected = primary
            .execute(&builder.insert(coordinate, id, WriteMode::Upsert))
            .await
            .unwrap();
        assert_eq!(affected, 0);
        assert_eq!(cluster.primary_len(), 1);
    }

    #[tokio::test]
    async fn insert_into_missing_partition_fails() {
        let cluster = MemoryCluster::new(ReplicaMode::default());
        let builder = StatementBuilder::default();
        let coordinate = ShardCoordinate::new(0, 0);
        let err = cluster
            .primary()
            .execute(&builder.insert(coordinate, RecordId(1), WriteMode::Insert))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::UnknownPartition(coordinate));
    }

    #[tokio::test]
    async fn schema_statements_create_partitions() {
        let cluster = MemoryCluster::new(ReplicaMode::default());
        let builder = StatementBuilder::default();
        let primary = cluster.primary();
        let coordinate = ShardCoordinate::new(1, 0);

        assert!(primary.execute(&builder.create_table(coordinate)).await.is_err());
        primary.execute(&builder.create_database(1)).await.unwrap();
        primary.execute(&builder.create_table(coordinate)).await.unwrap();
        assert_eq!(cluster.partition_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replica_applies_entries_after_lag() {
        let layout = layout();
        let cluster = MemoryCluster::new(ReplicaMode::Lagging(Duration::from_millis(50)))
            .with_partitions(&layout);
        let builder = StatementBuilder::default();
        let id = RecordId(3);
        let coordinate = layout.route(id);
        cluster
            .primary()
            .execute(&builder.insert(coordinate, id, WriteMode::Insert))
            .await
            .unwrap();

        let lookup = builder.point_lookup(coordinate, id);
        assert!(cluster.replica().query(&lookup).await.unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cluster.replica().query(&lookup).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn applied_entries_leave_the_log() {
        let layout = layout();
        let cluster = MemoryCluster::new(ReplicaMode::Lagging(Duration::from_millis(100)))
            .with_partitions(&layout);
        let builder = StatementBuilder::default();
        let primary = cluster.primary();
        for raw in 0..3 {
            let id = RecordId(raw);
            primary
                .execute(&builder.insert(layout.route(id), id, WriteMode::Insert))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let id = RecordId(3);
        primary
            .execute(&builder.insert(layout.route(id), id, WriteMode::Insert))
            .await
            .unwrap();

        assert_eq!(cluster.replica_len(), 0);
        assert_eq!(cluster.pending_replication(), 4);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cluster.replica_len(), 3);
        assert_eq!(cluster.pending_replication(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cluster.replica_len(), 4);
        assert_eq!(cluster.pending_replication(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_replica_never_catches_up() {
        let layout = layout();
        let cluster = MemoryCluster::new(ReplicaMode::Stalled).with_partitions(&layout);
        let builder = StatementBuilder::default();
        let id = RecordId(5);
        let coordinate = layout.route(id);
        cluster
            .primary()
            .execute(&builder.insert(coordinate, id, WriteMode::Insert))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(cluster.replica_len(), 0);

        cluster.set_replica_mode(ReplicaMode::Lagging(Duration::ZERO));
        assert_eq!(cluster.replica_len(), 1);
    }

    #[tokio::test]
    async fn injected_faults_surface_as_errors() {
        let layout = layout();
        let cluster = MemoryCluster::new(ReplicaMode::default()).with_partitions(&layout);
        let builder = StatementBuilder::default();
        let id = RecordId(9);
        let coordinate = layout.route(id);

        cluster.fail_writes_for([id]);
        assert!(cluster
            .primary()
            .execute(&builder.insert(coordinate, id, WriteMode::Insert))
            .await
            .is_err());

        cluster.fail_next_queries(1);
        let lookup = builder.point_lookup(coordinate, id);
        assert!(cluster.replica().query(&lookup).await.is_err());
        assert!(cluster.replica().query(&lookup).await.unwrap().is_empty());
        assert_eq!(cluster.replica_queries(), 2);

        cluster.set_replica_reachable(false);
        assert!(matches!(
            cluster.replica().ping().await,
            Err(StoreError::Unreachable(_))
        ));
    }
}
