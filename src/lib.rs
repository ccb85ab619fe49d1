//! Period indexer
//!
//! Follows a DAG-based chain's finalized periods over JSON-RPC and keeps a
//! RocksDB index of account balances, per-address transaction, DAG and
//! period history, event logs, decoded staking calls and internal
//! transactions. Every period is applied as one atomic batch together with
//! its finalization checkpoint.

pub mod batch;
pub mod block;
pub mod cli;
pub mod config;
pub mod consistency;
pub mod decode;
pub mod error;
pub mod fee;
pub mod genesis;
pub mod indexer;
pub mod keys;
pub mod ledger;
pub mod records;
pub mod rpc;
pub mod store;
pub mod sync_queue;
pub mod trace;
pub mod types;

#[cfg(test)]
mod testutil;

// Re-export the main types for convenience
pub use error::{IndexError, LedgerError};
pub use indexer::{Indexer, IndexerState};
pub use records::{Account, FinalizationData, TransactionRecord};
pub use store::{Order, Page, Storage};
