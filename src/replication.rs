//! Replica catch-up verification.
//!
//! The waiter polls the replica for a single sentinel record, normally the last one
//! written, with a bounded number of attempts and a fixed delay between them.
//!
//! # Precondition
//!
//! Seeing the sentinel on the replica is taken to mean every earlier write is visible
//! too. That only holds when the replication channel applies writes in commit order,
//! end to end. With a channel that can reorder or partially apply writes the check is
//! unsound and a full scan is needed instead.

use crate::error::{Result, SyncError};
use crate::model::{RecordId, ShardCoordinate, SyncOutcome, SyncReport};
use crate::statement::StatementBuilder;
use crate::store::ReplicaQuery;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Attempt budget for a replication wait.
///
/// The wait gives up after `max_attempts` lookups, sleeping `delay` after each
/// unsuccessful one, so it never runs much longer than `max_attempts * delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Upper bound on time spent sleeping between attempts.
    pub fn budget(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts)
    }
}

/// Poll the replica until `id` is visible in `coordinate` or the budget runs out.
///
/// A lookup that executes but returns no rows and a lookup that fails to execute both
/// consume an attempt; failures are logged and counted separately and never end the
/// loop early. `max_attempts == 0` times out without querying.
///
/// See the module docs for the ordered-replication precondition.
pub async fn await_replication(
    id: RecordId,
    coordinate: ShardCoordinate,
    policy: RetryPolicy,
    statements: &StatementBuilder,
    replica: &dyn ReplicaQuery,
) -> SyncReport {
    let lookup = statements.point_lookup(coordinate, id);
    let started = Instant::now();
    let mut attempts = 0u32;
    let mut query_failures = 0u32;

    while attempts < policy.max_attempts {
        attempts += 1;
        match replica.query(&lookup).await {
            Ok(rows) if !rows.is_empty() => {
                info!(%id, %coordinate, attempts, "replica caught up");
                return SyncReport {
                    outcome: SyncOutcome::Confirmed,
                    attempts,
                    query_failures,
                    elapsed: started.elapsed(),
                };
            }
            Ok(_) => {
                debug!(%id, %coordinate, attempt = attempts, "sentinel not yet visible on replica");
            }
            Err(e) => {
                query_failures += 1;
                warn!(%id, %coordinate, attempt = attempts, error = %e, "replica lookup failed");
            }
        }
        tokio::time::sleep(policy.delay).await;
    }

    error!(
        %id,
        %coordinate,
        attempts,
        query_failures,
        "timed out waiting for replica to catch up"
    );
    SyncReport {
        outcome: SyncOutcome::TimedOut,
        attempts,
        query_failures,
        elapsed: started.elapsed(),
    }
}

/// Run [`await_replication`] on its own task.
///
/// The report is handed back through a one-shot channel that is written exactly once,
/// so the caller can start waiting before or after the task finishes.
pub fn spawn_waiter(
    id: RecordId,
    coordinate: ShardCoordinate,
    policy: RetryPolicy,
    statements: StatementBuilder,
    replica: Arc<dyn ReplicaQuery>,
) -> ReplicationHandle {
    let (tx, rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let report = await_replication(id, coordinate, policy, &statements, replica.as_ref()).await;
        // The receiver may already be gone if the caller stopped caring.
        let _ = tx.send(report);
    });
    ReplicationHandle {
        rx,
        task,
        settled: None,
    }
}

/// Caller's side of a spawned replication wait.
#[derive(Debug)]
pub struct ReplicationHandle {
    rx: oneshot::Receiver<SyncReport>,
    task: JoinHandle<()>,
    settled: Option<SyncReport>,
}

impl ReplicationHandle {
    /// Current state without blocking: `Pending` until the waiter reports.
    ///
    /// A waiter that was aborted or panicked before reporting also shows up as
    /// `TimedOut`, even if attempts were left in its budget. [`wait`](Self::wait)
    /// tells the two apart: it returns [`SyncError::WaiterLost`] for a waiter that
    /// never reported.
    pub fn outcome(&mut self) -> SyncOutcome {
        if let Some(report) = self.settled {
            return report.outcome;
        }
        match self.rx.try_recv() {
            Ok(report) => {
                self.settled = Some(report);
                report.outcome
            }
            Err(oneshot::error::TryRecvError::Empty) => SyncOutcome::Pending,
            Err(oneshot::error::TryRecvError::Closed) => SyncOutcome::TimedOut,
        }
    }

    /// Block until the waiter reaches a terminal state.
    ///
    /// This is the authoritative result. A waiter that stopped without reporting is
    /// [`SyncError::WaiterLost`] here, where [`outcome`](Self::outcome) can only say
    /// `TimedOut`.
    pub async fn wait(self) -> Result<SyncReport> {
        if let Some(report) = self.settled {
            return Ok(report);
        }
        match self.rx.await {
            Ok(report) => Ok(report),
            Err(_) => {
                if let Err(e) = self.task.await {
                    error!(error = %e, "replication waiter task failed");
                }
                Err(SyncError::WaiterLost)
            }
        }
    }

    /// Stop polling. A later [`wait`](Self::wait) returns [`SyncError::WaiterLost`].
    pub fn abort(&self) {
        self.task.abort();
    }
}
