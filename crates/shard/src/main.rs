//! shard-sync: catalog replication process

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use shard::replication::PartitionOutcome;
use shard::{schema, ReplicationEngine, ReplicationScheduler, ShardConfig, ShardRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[clap(name = "shard-sync")]
#[clap(about = "Replicates the central course catalog into every branch partition")]
struct Args {
    /// Path to the TOML configuration file
    #[clap(long, env = "SHARD_CONFIG", default_value = "shard.toml")]
    config: PathBuf,

    /// Create missing tables in the central store and every partition first
    #[clap(long)]
    init_schema: bool,

    /// Run a single replication pass and exit
    #[clap(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenv().ok();

    let args = Args::parse();

    let config = ShardConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let _log_guard = monitoring::init_logging(&config.logging.clone().with_env_overrides())?;

    info!("Starting shard-sync with {} branches", config.branches.len());

    let registry = Arc::new(ShardRegistry::connect(&config).await?);

    if args.init_schema {
        schema::create_central_schema(&registry.central().await?).await?;
        for partition in registry.all_connections().await {
            schema::create_partition_schema(partition.connection()).await?;
        }
    }

    let engine = Arc::new(ReplicationEngine::new(
        registry.clone(),
        config.replication.clone(),
    ));

    if args.once {
        let report = engine.run_once().await?;
        for partition in &report.partitions {
            match &partition.outcome {
                PartitionOutcome::Committed { rows } => {
                    info!("Branch {}: {} rows", partition.partition_id, rows)
                }
                PartitionOutcome::RolledBack { reason } => {
                    warn!("Branch {}: rolled back: {}", partition.partition_id, reason)
                }
            }
        }
    } else if config.replication.enabled {
        let interval = config.replication.interval()?;
        let scheduler = ReplicationScheduler::new(engine.clone(), interval);

        // Handle shutdown gracefully
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Received shutdown signal");
        };
        scheduler.run(shutdown).await;
    } else {
        warn!("Replication is disabled in the configuration; nothing to do");
    }

    for (target, e) in registry.close_all().await {
        warn!("Close failed for {}: {}", target, e);
    }
    info!("shard-sync stopped");
    Ok(())
}
