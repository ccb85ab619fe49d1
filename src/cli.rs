//! CLI implementation for indexctl
//!
//! Read-only inspection of an index directory. All commands output pretty
//! JSON.

use crate::records::{DagRecord, PeriodRecord, TransactionRecord};
use crate::store::{Order, Storage};
use crate::types::{parse_address, parse_hash};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;

/// Index inspection tool
#[derive(Parser)]
#[command(name = "indexctl")]
#[command(about = "Inspect a period index database")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./index_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Paging options shared by the list commands.
#[derive(Args, Debug, Clone, Copy)]
pub struct PageArgs {
    /// Offset of the first item
    #[arg(long, default_value_t = 0)]
    from: u64,

    /// Maximum number of items
    #[arg(long, default_value_t = 25)]
    count: u64,

    /// Oldest records first instead of newest first
    #[arg(long)]
    oldest_first: bool,
}

impl PageArgs {
    fn order(&self) -> Order {
        if self.oldest_first {
            Order::OldestFirst
        } else {
            Order::NewestFirst
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the finalization checkpoint and total supply
    Finalization,
    /// List holders by descending balance
    Holders {
        #[arg(long, default_value_t = 0)]
        from: u64,
        #[arg(long, default_value_t = 25)]
        count: u64,
    },
    /// Get the balance of an address
    Balance {
        /// Address (hex, with or without 0x prefix)
        address: String,
    },
    /// Page through the transactions of an address
    Transactions {
        address: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Page through the DAG blocks proposed by an address
    Dags {
        address: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Page through the periods authored by an address
    Periods {
        address: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Get a contract call transaction by hash
    Tx {
        /// Transaction hash (64 hex chars, with or without 0x prefix)
        hash: String,
    },
    /// Get the internal transactions of a transaction
    Internal { hash: String },
    /// Get the event logs of a transaction
    Logs { hash: String },
    /// Get the decoded call parameters of a transaction
    Calldata { hash: String },
    /// Get the sequence counters of an address
    Stats { address: String },
    /// Get the periods finalized during one ISO week
    Week {
        /// ISO year
        year: i32,
        /// ISO week number (1-53)
        week: u32,
    },
    /// Get the stored genesis hash
    GenesisHash,
}

/// Run the CLI command and print JSON output.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = execute(&storage, cli.command)?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to render JSON")
}

/// Evaluate one command against an open index.
pub fn execute(storage: &Storage, command: Commands) -> Result<Value> {
    let result = match command {
        Commands::Finalization => {
            let finalization = storage.get_finalization_data()?;
            json!({
                "finalization": to_json(&finalization)?,
                "total_supply": format!("0x{:x}", storage.get_total_supply()?),
            })
        }
        Commands::Holders { from, count } => to_json(&storage.get_holders_page(from, count)?)?,
        Commands::Balance { address } => {
            let addr = parse_address(&address)?;
            let balance = storage.get_account(addr)?.map(|a| format!("0x{:x}", a.balance));
            json!({
                "address": format!("0x{:x}", addr),
                "balance": balance,
            })
        }
        Commands::Transactions { address, page } => {
            let addr = parse_address(&address)?;
            to_json(&storage.get_page::<TransactionRecord>(addr, page.from, page.count, page.order())?)?
        }
        Commands::Dags { address, page } => {
            let addr = parse_address(&address)?;
            to_json(&storage.get_page::<DagRecord>(addr, page.from, page.count, page.order())?)?
        }
        Commands::Periods { address, page } => {
            let addr = parse_address(&address)?;
            to_json(&storage.get_page::<PeriodRecord>(addr, page.from, page.count, page.order())?)?
        }
        Commands::Tx { hash } => {
            let hash = parse_hash(&hash)?;
            json!({
                "hash": format!("0x{:x}", hash),
                "transaction": to_json(&storage.get_transaction_by_hash(hash)?)?,
            })
        }
        Commands::Internal { hash } => {
            let hash = parse_hash(&hash)?;
            json!({
                "hash": format!("0x{:x}", hash),
                "internal_transactions": to_json(&storage.get_internal_transactions(hash)?.data)?,
            })
        }
        Commands::Logs { hash } => {
            let hash = parse_hash(&hash)?;
            json!({
                "hash": format!("0x{:x}", hash),
                "logs": to_json(&storage.get_transaction_logs(hash)?.data)?,
            })
        }
        Commands::Calldata { hash } => {
            let hash = parse_hash(&hash)?;
            json!({
                "hash": format!("0x{:x}", hash),
                "calldata": to_json(&storage.get_calldata(hash)?)?,
            })
        }
        Commands::Stats { address } => {
            let addr = parse_address(&address)?;
            json!({
                "address": format!("0x{:x}", addr),
                "stats": to_json(&storage.get_address_stats(addr)?)?,
            })
        }
        Commands::Week { year, week } => to_json(&storage.get_week_stats(year, week)?)?,
        Commands::GenesisHash => {
            let hash = storage.genesis_hash()?.map(|h| format!("0x{:x}", h));
            json!({ "genesis_hash": hash })
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Account, FinalizationData};
    use alloy_primitives::{address, B256, U256};
    use tempfile::TempDir;

    fn seeded() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let mut batch = storage.batch();
        batch
            .save_accounts(&[
                Account {
                    address: address!("2222222222222222222222222222222222222222"),
                    balance: U256::from(500u64),
                },
                Account {
                    address: address!("1111111111111111111111111111111111111111"),
                    balance: U256::from(255u64),
                },
            ])
            .unwrap();
        batch
            .set_finalization_data(&FinalizationData {
                period: 7,
                dag_count: 3,
                trx_count: 2,
            })
            .unwrap();
        batch.set_genesis_hash(B256::repeat_byte(0xab));
        batch.set_total_supply(U256::from(755u64));
        batch.commit().unwrap();
        (dir, storage)
    }

    #[test]
    fn test_finalization_and_genesis() {
        let (_dir, storage) = seeded();
        let out = execute(&storage, Commands::Finalization).unwrap();
        assert_eq!(out["finalization"]["period"], 7);
        assert_eq!(out["total_supply"], "0x2f3");

        let out = execute(&storage, Commands::GenesisHash).unwrap();
        assert_eq!(out["genesis_hash"], format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn test_balance_and_holders() {
        let (_dir, storage) = seeded();
        let out = execute(
            &storage,
            Commands::Balance {
                address: "1111111111111111111111111111111111111111".to_string(),
            },
        )
        .unwrap();
        assert_eq!(out["balance"], "0xff");

        let out = execute(
            &storage,
            Commands::Balance {
                address: "0x3333333333333333333333333333333333333333".to_string(),
            },
        )
        .unwrap();
        assert!(out["balance"].is_null());

        let out = execute(&storage, Commands::Holders { from: 1, count: 5 }).unwrap();
        assert_eq!(out["total"], 2);
        assert_eq!(out["items"].as_array().unwrap().len(), 1);
        assert_eq!(out["has_next"], false);
    }

    #[test]
    fn test_empty_history_page() {
        let (_dir, storage) = seeded();
        let out = execute(
            &storage,
            Commands::Transactions {
                address: "0x1111111111111111111111111111111111111111".to_string(),
                page: PageArgs {
                    from: 0,
                    count: 10,
                    oldest_first: false,
                },
            },
        )
        .unwrap();
        assert_eq!(out["total"], 0);
        assert!(out["items"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_week_without_periods() {
        let (_dir, storage) = seeded();
        let out = execute(&storage, Commands::Week { year: 2024, week: 3 }).unwrap();
        assert_eq!(out["year"], 2024);
        assert_eq!(out["week"], 3);
        assert_eq!(out["periods_count"], 0);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let (_dir, storage) = seeded();
        assert!(execute(&storage, Commands::Stats { address: "0x12".to_string() }).is_err());
    }
}
