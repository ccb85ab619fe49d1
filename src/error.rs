//! Error classification for the indexing pipeline.
//!
//! The indexer restarts a run after a fixed delay for every error that is
//! not fatal. Fatal errors mean the on-disk index can no longer be trusted
//! (or the node cannot be talked to at all) and terminate the process.

use alloy_primitives::{Address, U256};
use thiserror::Error;

/// Errors that can occur while indexing.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Upstream node failure (connection loss, RPC error).
    #[error("chain client error: {0:#}")]
    Chain(#[source] anyhow::Error),

    /// The node returned collections whose lengths disagree.
    #[error(
        "period {period}: node reports {reported} transactions, fetched {fetched}, traces {traces}"
    )]
    CountMismatch {
        period: u64,
        reported: usize,
        fetched: usize,
        traces: usize,
    },

    /// A log or trace payload could not be decoded.
    #[error("failed to decode {what}: {reason}")]
    Decode { what: String, reason: String },

    /// A record could not be serialized.
    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: postcard::Error,
    },

    /// Durable write or read failure.
    #[error("storage failure: {0:#}")]
    Storage(#[source] anyhow::Error),

    /// A balance would go below zero.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The node speaks a protocol we do not support.
    #[error("unsupported protocol version {version} (minimum {minimum})")]
    UnsupportedVersion { version: u64, minimum: u64 },
}

impl IndexError {
    /// Returns `true` if the process must stop instead of retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Encode { .. } | Self::Storage(_) | Self::Ledger(_) | Self::UnsupportedVersion { .. }
        )
    }

    pub(crate) fn decode(what: impl Into<String>, reason: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

/// Ledger consistency errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("balance of {address} would go negative: balance {balance}, debit {amount}")]
    Overdraft {
        address: Address,
        balance: U256,
        amount: U256,
    },

    #[error("balance of {address} overflows")]
    Overflow { address: Address },
}
