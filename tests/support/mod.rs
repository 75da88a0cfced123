use std::sync::Arc;
use std::time::Duration;

use shardsync_rs::memory::{MemoryCluster, ReplicaMode};
use shardsync_rs::{Orchestrator, RecordId, RetryPolicy, RunPlan, ShardLayout};

#[allow(dead_code)]
pub const START_ID: i64 = 100_000_000;
#[allow(dead_code)]
pub const RECORD_COUNT: u64 = 1_000;

#[allow(dead_code)]
pub fn layout_8x8() -> ShardLayout {
    ShardLayout::new(8, 8).expect("valid layout")
}

/// Plan over `count` ids from [`START_ID`] with an 8x8 layout.
#[allow(dead_code)]
pub fn plan(count: u64, max_attempts: u32, delay: Duration) -> RunPlan {
    RunPlan::new(layout_8x8(), RecordId(START_ID), count)
        .expect("valid plan")
        .with_retry_policy(RetryPolicy::new(max_attempts, delay))
}

/// Cluster whose partitions already exist, for plans that skip bootstrap.
#[allow(dead_code)]
pub fn cluster_with_partitions(mode: ReplicaMode) -> MemoryCluster {
    MemoryCluster::new(mode).with_partitions(&layout_8x8())
}

#[allow(dead_code)]
pub async fn connect(plan: RunPlan, cluster: &MemoryCluster) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::connect(
        plan,
        Arc::new(cluster.primary()),
        Arc::new(cluster.replica()),
    )
    .await?;
    Ok(orchestrator)
}
