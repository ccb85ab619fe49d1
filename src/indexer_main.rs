//! Period indexer daemon
//!
//! Follows a node's finalized periods and keeps the local index (balances,
//! per-address history, event logs, internal transactions) up to date.

use anyhow::{Context, Result};
use clap::Parser;
use period_indexer::config::IndexerConfig;
use period_indexer::indexer::Indexer;
use period_indexer::rpc::RpcClient;
use period_indexer::store::Storage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Period indexer
#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Index finalized periods into a local RocksDB database")]
struct Args {
    /// RPC endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:7777")]
    rpc_url: String,

    /// Path to RocksDB database directory
    #[arg(short, long, default_value = "./index_db")]
    db_path: PathBuf,

    /// Maximum number of periods fetched ahead of processing
    #[arg(long, default_value_t = 10)]
    sync_queue_limit: u64,

    /// Seconds to wait before restarting after an error
    #[arg(long, default_value_t = 5)]
    retry_secs: u64,

    /// Staking contract address
    #[arg(long)]
    staking_contract: Option<String>,

    /// Log filter (e.g. `info`, `period_indexer=debug`)
    #[arg(long, default_value = "info")]
    log_level: String,
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level)
        .with_context(|| format!("Invalid log filter: {}", args.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = IndexerConfig {
        sync_queue_limit: args.sync_queue_limit,
        retry_interval: Duration::from_secs(args.retry_secs),
        ..Default::default()
    };
    if let Some(contract) = &args.staking_contract {
        config = config.with_staking_contract(contract)?;
    }
    config.validate()?;

    info!("Starting period indexer");
    info!("RPC URL: {}", args.rpc_url);
    info!("Database: {:?}", args.db_path);

    let client = RpcClient::new(args.rpc_url, config.head_poll_interval);
    let storage = Storage::open(&args.db_path)
        .with_context(|| format!("Failed to open database at {:?}", args.db_path))?;

    let mut indexer = Indexer::new(storage, config, Arc::new(client));
    tokio::select! {
        result = indexer.run_forever() => {
            result.context("Indexer stopped on fatal error")?;
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping");
        }
    }

    info!("Indexer stopped");
    Ok(())
}
