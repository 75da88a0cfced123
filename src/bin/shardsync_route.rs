use shardsync_rs::config::ShardSyncConfig;
use shardsync_rs::{record_hash, shard_histogram, RecordId, ShardNaming};

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
        r#"shardsync_route - show which partition owns a record

USAGE:
    shardsync_route [OPTIONS] --ids <ID,ID,...>
    shardsync_route [OPTIONS] --histogram [--start-id <ID>] [--count <N>]

OPTIONS:
    -c, --config <FILE>     Path to config file (TOML)
        --ids <IDS>         Comma-separated record ids to route
        --histogram         Print per-partition counts for a sequential range
        --start-id <ID>     First id of the range [default: run.start_id]
        --count <N>         Length of the range [default: run.record_count]
    -h, --help              Print help
"#
    );
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("SHARDSYNC_CONFIG").ok());
    let config = ShardSyncConfig::from_env(config_path.as_deref())?;
    let plan = config.plan()?;
    let layout = plan.layout;
    let naming = ShardNaming {
        database_prefix: config.layout.database_prefix.clone(),
        table_prefix: config.layout.table_prefix.clone(),
    };

    if has_flag("--histogram") {
        let start = match parse_arg("--start-id") {
            Some(value) => RecordId(value.parse()?),
            None => plan.start,
        };
        let count = match parse_arg("--count") {
            Some(value) => value.parse()?,
            None => plan.count,
        };
        let counts = shard_histogram(&layout, start, count);
        let mean = count as f64 / f64::from(layout.total_shards());
        for (coordinate, hits) in layout.coordinates().zip(counts.iter()) {
            let ratio = if mean > 0.0 { *hits as f64 / mean } else { 0.0 };
            println!("{:<24} {:>10} {:>6.2}x", naming.table(coordinate), hits, ratio);
        }
        return Ok(());
    }

    let ids = parse_arg("--ids")
        .ok_or_else(|| anyhow::anyhow!("--ids or --histogram is required"))?;
    for raw in ids.split(',').filter(|s| !s.is_empty()) {
        let id = RecordId(raw.trim().parse()?);
        let coordinate = layout.route(id);
        println!(
            "{id} crc32={:#010x} shard={} -> {}",
            record_hash(id),
            coordinate.flat_index(&layout),
            naming.table(coordinate)
        );
    }

    Ok(())
}
