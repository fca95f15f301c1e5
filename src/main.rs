use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gameshard::metadata::TableMetadata;
use gameshard::routing::USER_SHARD_TABLE;
use gameshard::{Coordinator, GameConfig, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gameshard")]
#[command(about = "Inspect and exercise a sharded game database topology")]
struct Cli {
    /// Config file; defaults to conf/game/<GAMEMODE>.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect every target and print the topology
    Topology,
    /// Print the shard a user id is assigned to
    Resolve { key: u64 },
    /// Assign a user id to a shard and commit the assignment
    Assign { key: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => GameConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => GameConfig::load().context("failed to load config")?,
    };

    let coordinator = Coordinator::connect(config)
        .await
        .context("failed to build topology")?;
    let result = run(&coordinator, cli.command).await;
    coordinator.close().await.context("failed to close topology")?;
    result
}

async fn run(coordinator: &Arc<Coordinator>, command: Command) -> Result<()> {
    match command {
        Command::Topology => {
            let topology = coordinator.topology();
            println!(
                "shards: {}  replicas: {}",
                topology.shard_count(),
                topology.replica_count()
            );
            for target in topology.targets() {
                println!("  {:<24} {}", target.label(), target.to_url());
            }
            Ok(())
        }
        Command::Resolve { key } => {
            let mut ctx = coordinator.begin_request()?;
            let meta = TableMetadata::sharded_by_user(USER_SHARD_TABLE);
            let result = match ctx.resolve_shard(&meta, &Value::from(key)).await {
                Ok(shard) => Ok(shard),
                Err(err) if err.is_not_assigned() => Ok(None),
                Err(err) => Err(err),
            };
            ctx.rollback().await?;
            match result? {
                Some(shard) => println!("{} -> shard {}", key, shard),
                None => println!("{} is not assigned", key),
            }
            Ok(())
        }
        Command::Assign { key } => {
            let mut ctx = coordinator.begin_request()?;
            let shard = match ctx.assign_shard(&Value::from(key)).await {
                Ok(shard) => shard,
                Err(err) => {
                    ctx.rollback().await?;
                    return Err(err.into());
                }
            };
            let report = ctx.commit().await;
            ctx.rollback().await?;
            let report = report.context("commit failed")?;
            println!("{} -> shard {} ({})", key, shard, report);
            Ok(())
        }
    }
}
