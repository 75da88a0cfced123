use std::sync::Arc;

use shardsync_rs::config::{
    ConfigOverrides, LayoutOverrides, ReplicationOverrides, RunOverrides, ShardSyncConfig,
    SimulationOverrides,
};
use shardsync_rs::memory::MemoryCluster;
use shardsync_rs::{Orchestrator, RunSummary};
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    eprintln!(
        r#"shardsync_run - write, verify replication, read back

USAGE:
    shardsync_run [OPTIONS]

OPTIONS:
    -c, --config <FILE>     Path to config file (TOML)
    -n, --count <N>         Number of records [default: 1000]
        --start-id <ID>     First record id [default: 100000000]
        --groups <G>        Partition groups [default: 8]
        --slots <S>         Slots per group [default: 8]
        --upsert            Write with upserts instead of plain inserts
        --attempts <N>      Replica lookups before giving up [default: 30]
        --delay-ms <MS>     Delay between replica lookups [default: 100]
        --lag-ms <MS>       Simulated replication lag [default: 50]
        --stalled           Simulate a replica that never catches up
        --json              Print the summary as JSON
    -h, --help              Print help

ENVIRONMENT:
    SHARDSYNC_CONFIG                    Path to config file
    SHARDSYNC_RUN__RECORD_COUNT         Number of records
    SHARDSYNC_REPLICATION__MAX_ATTEMPTS Replica lookups before giving up
    RUST_LOG                            Log filter [default: info]

CONFIG FILE (shardsync.toml):
    [layout]
    groups = 8
    slots_per_group = 8

    [replication]
    max_attempts = 30
    retry_delay_ms = 100
"#
    );
}

fn build_overrides() -> anyhow::Result<ConfigOverrides> {
    let mut overrides = ConfigOverrides::default();

    let layout = LayoutOverrides {
        groups: parse_arg("--groups").map(|v| v.parse::<u32>()).transpose()?,
        slots_per_group: parse_arg("--slots").map(|v| v.parse::<u32>()).transpose()?,
    };
    if layout.groups.is_some() || layout.slots_per_group.is_some() {
        overrides.layout = Some(layout);
    }

    let run = RunOverrides {
        start_id: parse_arg("--start-id").map(|v| v.parse::<i64>()).transpose()?,
        record_count: parse_arg("--count")
            .or_else(|| parse_arg("-n"))
            .map(|v| v.parse::<u64>())
            .transpose()?,
        write_mode: has_flag("--upsert").then_some(shardsync_rs::WriteMode::Upsert),
    };
    if run.start_id.is_some() || run.record_count.is_some() || run.write_mode.is_some() {
        overrides.run = Some(run);
    }

    let replication = ReplicationOverrides {
        max_attempts: parse_arg("--attempts").map(|v| v.parse::<u32>()).transpose()?,
        retry_delay_ms: parse_arg("--delay-ms").map(|v| v.parse::<u64>()).transpose()?,
    };
    if replication.max_attempts.is_some() || replication.retry_delay_ms.is_some() {
        overrides.replication = Some(replication);
    }

    let simulation = SimulationOverrides {
        replication_lag_ms: parse_arg("--lag-ms").map(|v| v.parse::<u64>()).transpose()?,
        stalled: has_flag("--stalled").then_some(true),
    };
    if simulation.replication_lag_ms.is_some() || simulation.stalled.is_some() {
        overrides.simulation = Some(simulation);
    }

    Ok(overrides)
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Insert completed. Wrote {}/{} users ({} failed).",
        summary.written, summary.attempted, summary.write_failures
    );
    println!(
        "Replica sync {} after {} attempt(s) in {} ms ({} failed lookups).",
        summary.sync.outcome,
        summary.sync.attempts,
        summary.sync.elapsed.as_millis(),
        summary.sync.query_failures
    );
    match summary.confirmed {
        Some(confirmed) => println!(
            "Read completed. Found {}/{} users ({} failed lookups).",
            confirmed, summary.attempted, summary.read_failures
        ),
        None => eprintln!("Data synchronization failed. Read phase skipped."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load config: CLI > Env > File > Defaults
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("SHARDSYNC_CONFIG").ok());
    let config = ShardSyncConfig::load(config_path.as_deref(), build_overrides()?)?;
    let plan = config.plan()?;

    let mut cluster = MemoryCluster::new(config.simulation.replica_mode());
    if !plan.bootstrap_schema {
        // Without bootstrap the partitions have to exist already.
        cluster = cluster.with_partitions(&plan.layout);
    }

    let count = plan.count;
    let orchestrator =
        Orchestrator::connect(plan, Arc::new(cluster.primary()), Arc::new(cluster.replica()))
            .await?;
    println!("Inserting {count} users...");
    let summary = orchestrator.run().await?;

    if has_flag("--json") {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}
