//! Write, verify, read.
//!
//! A run writes a sequential id range through the primary, waits for the replica to
//! show the last id written, then reads the whole range back from the replica. Each
//! record is routed independently on both passes; nothing computed during the write
//! pass is reused by the read pass.
//!
//! Individual record failures are logged and counted, never fatal. A run aborts only
//! when a collaborator is unreachable at start-up or the schema cannot be created.

use crate::error::{Result, StoreRole, SyncError};
use crate::model::{record_range, ReadPhase, RecordId, RunSummary, SyncOutcome, SyncReport, WritePhase};
use crate::replication::{spawn_waiter, ReplicationHandle, RetryPolicy};
use crate::sharding::ShardLayout;
use crate::statement::{ShardNaming, Statement, StatementBuilder, WriteMode};
use crate::store::{PrimaryExecutor, ReplicaQuery};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Validated parameters of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub layout: ShardLayout,
    pub start: RecordId,
    pub count: u64,
    pub naming: ShardNaming,
    pub write_mode: WriteMode,
    pub bootstrap_schema: bool,
    pub retry: RetryPolicy,
}

impl RunPlan {
    /// Plan for `count` ids starting at `start`. The last id must not pass `i64::MAX`.
    pub fn new(layout: ShardLayout, start: RecordId, count: u64) -> Result<Self> {
        if count > 0 {
            let last_offset = i64::try_from(count - 1)
                .map_err(|_| SyncError::Range(format!("record count {count} is too large")))?;
            if start.0.checked_add(last_offset).is_none() {
                return Err(SyncError::Range(format!(
                    "{count} records starting at {start} overflow the id space"
                )));
            }
        }
        Ok(Self {
            layout,
            start,
            count,
            naming: ShardNaming::default(),
            write_mode: WriteMode::Insert,
            bootstrap_schema: true,
            retry: RetryPolicy::new(
                crate::config::DEFAULT_MAX_ATTEMPTS,
                Duration::from_millis(crate::config::DEFAULT_RETRY_DELAY_MS),
            ),
        })
    }

    pub fn with_naming(mut self, naming: ShardNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap_schema: bool) -> Self {
        self.bootstrap_schema = bootstrap_schema;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Last id of the range, used as the replication sentinel.
    pub fn sentinel(&self) -> Option<RecordId> {
        let last_offset = i64::try_from(self.count.checked_sub(1)?).ok()?;
        self.start.0.checked_add(last_offset).map(RecordId)
    }
}

/// Drives a run against a primary and a replica.
pub struct Orchestrator {
    plan: RunPlan,
    statements: StatementBuilder,
    primary: Arc<dyn PrimaryExecutor>,
    replica: Arc<dyn ReplicaQuery>,
}

impl Orchestrator {
    /// Check that both collaborators answer before anything is written.
    pub async fn connect(
        plan: RunPlan,
        primary: Arc<dyn PrimaryExecutor>,
        replica: Arc<dyn ReplicaQuery>,
    ) -> Result<Self> {
        primary.ping().await.map_err(|source| SyncError::Startup {
            role: StoreRole::Primary,
            source,
        })?;
        replica.ping().await.map_err(|source| SyncError::Startup {
            role: StoreRole::Replica,
            source,
        })?;
        let statements = StatementBuilder::new(plan.naming.clone());
        Ok(Self {
            plan,
            statements,
            primary,
            replica,
        })
    }

    pub fn plan(&self) -> &RunPlan {
        &self.plan
    }

    /// Create every database and table of the layout on the primary.
    pub async fn bootstrap_schema(&self) -> Result<()> {
        let layout = self.plan.layout;
        for group in 0..layout.groups() {
            self.execute_ddl(self.statements.create_database(group)).await?;
        }
        for coordinate in layout.coordinates() {
            self.execute_ddl(self.statements.create_table(coordinate)).await?;
        }
        info!(
            groups = layout.groups(),
            slots_per_group = layout.slots_per_group(),
            "schema ready"
        );
        Ok(())
    }

    async fn execute_ddl(&self, statement: Statement) -> Result<()> {
        self.primary
            .execute(&statement)
            .await
            .map(|_| ())
            .map_err(|source| SyncError::Schema {
                statement: statement.sql,
                source,
            })
    }

    /// Insert `count` sequential ids into their owning shards on the primary.
    ///
    /// A failed insert is logged and counted; the remaining ids are still attempted.
    pub async fn bulk_write(&self, start: RecordId, count: u64) -> WritePhase {
        let mut phase = WritePhase::default();
        for id in record_range(start, count) {
            phase.attempted += 1;
            let coordinate = self.plan.layout.route(id);
            let statement = self.statements.insert(coordinate, id, self.plan.write_mode);
            match self.primary.execute(&statement).await {
                Ok(_) => phase.written += 1,
                Err(e) => {
                    phase.failed += 1;
                    warn!(%id, %coordinate, statement = %statement, error = %e, "insert failed");
                }
            }
        }
        info!(
            attempted = phase.attempted,
            written = phase.written,
            failed = phase.failed,
            "write phase completed"
        );
        phase
    }

    /// Look up `count` sequential ids on the replica, re-routing each one.
    ///
    /// A failed lookup is logged and skipped; it counts as not confirmed.
    pub async fn bulk_read(&self, start: RecordId, count: u64) -> ReadPhase {
        let mut phase = ReadPhase::default();
        for id in record_range(start, count) {
            let coordinate = self.plan.layout.route(id);
            let statement = self.statements.point_lookup(coordinate, id);
            match self.replica.query(&statement).await {
                Ok(rows) if !rows.is_empty() => phase.confirmed += 1,
                Ok(_) => phase.missing += 1,
                Err(e) => {
                    phase.failed += 1;
                    warn!(%id, %coordinate, statement = %statement, error = %e, "lookup failed");
                }
            }
        }
        info!(
            confirmed = phase.confirmed,
            missing = phase.missing,
            failed = phase.failed,
            "read phase completed"
        );
        phase
    }

    /// Start polling the replica for `sentinel` on a separate task.
    ///
    /// Confirming the sentinel stands in for the whole batch only under ordered
    /// replication; see [`crate::replication`].
    pub fn spawn_waiter(&self, sentinel: RecordId) -> ReplicationHandle {
        let coordinate = self.plan.layout.route(sentinel);
        spawn_waiter(
            sentinel,
            coordinate,
            self.plan.retry,
            self.statements.clone(),
            Arc::clone(&self.replica),
        )
    }

    /// Bootstrap (if planned), write, wait for the replica, then read back.
    ///
    /// The read phase is skipped when the replica does not catch up in time; the
    /// summary then reports [`RunSummary::sync_failed`]. A waiter that stops without
    /// reporting is treated the same way, with zero attempts.
    pub async fn run(&self) -> Result<RunSummary> {
        if self.plan.bootstrap_schema {
            self.bootstrap_schema().await?;
        }

        let (start, count) = (self.plan.start, self.plan.count);
        info!(%start, count, "writing records to primary");
        let write = self.bulk_write(start, count).await;

        let Some(sentinel) = self.plan.sentinel() else {
            return Ok(RunSummary::from_phases(
                write,
                SyncReport::trivially_confirmed(),
                Some(ReadPhase::default()),
            ));
        };

        let waiting = Instant::now();
        let sync = match self.spawn_waiter(sentinel).wait().await {
            Ok(report) => report,
            Err(e) => {
                error!(%sentinel, error = %e, "no report from replication waiter");
                SyncReport {
                    outcome: SyncOutcome::TimedOut,
                    attempts: 0,
                    query_failures: 0,
                    elapsed: waiting.elapsed(),
                }
            }
        };
        match sync.outcome {
            SyncOutcome::Confirmed => {
                info!(%sentinel, attempts = sync.attempts, "reading records from replica");
                let read = self.bulk_read(start, count).await;
                Ok(RunSummary::from_phases(write, sync, Some(read)))
            }
            _ => {
                error!(%sentinel, attempts = sync.attempts, "replica did not catch up, skipping reads");
                Ok(RunSummary::from_phases(write, sync, None))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ShardLayout {
        ShardLayout::new(8, 8).unwrap()
    }

    #[test]
    fn sentinel_is_last_id_of_range() {
        let plan = RunPlan::new(layout(), RecordId(100_000_000), 1_000).unwrap();
        assert_eq!(plan.sentinel(), Some(RecordId(100_000_999)));
        let empty = RunPlan::new(layout(), RecordId(5), 0).unwrap();
        assert_eq!(empty.sentinel(), None);
    }

    #[test]
    fn plan_rejects_ranges_past_i64_max() {
        assert!(matches!(
            RunPlan::new(layout(), RecordId(i64::MAX), 2),
            Err(SyncError::Range(_))
        ));
        assert!(RunPlan::new(layout(), RecordId(i64::MAX), 1).is_ok());
        assert!(matches!(
            RunPlan::new(layout(), RecordId(0), u64::MAX),
            Err(SyncError::Range(_))
        ));
    }
}
