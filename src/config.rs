//! Indexer configuration
//!
//! Operational settings with their defaults. Chain parameters that come
//! from the genesis object live in [`crate::types::ChainConfig`].

use crate::types::parse_address;
use alloy_primitives::{address, Address};
use anyhow::{Context, Result};
use std::time::Duration;

/// Staking (DPOS) contract address.
pub const DEFAULT_STAKING_CONTRACT: Address = address!("00000000000000000000000000000000000000fe");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerConfig {
    /// Delay before a failed run is restarted
    pub retry_interval: Duration,
    /// Maximum number of periods fetched ahead of processing
    pub sync_queue_limit: u64,
    /// Gap to the node's latest period above which the indexer syncs in
    /// bulk instead of following new heads
    pub live_sync_threshold: u64,
    /// Delay between retries of a failed period fetch
    pub fetch_backoff: Duration,
    /// Polling interval of the new-heads subscription
    pub head_poll_interval: Duration,
    pub staking_contract: Address,
    pub min_protocol_version: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(5),
            sync_queue_limit: 10,
            live_sync_threshold: 100,
            fetch_backoff: Duration::from_secs(1),
            head_poll_interval: Duration::from_secs(2),
            staking_contract: DEFAULT_STAKING_CONTRACT,
            min_protocol_version: 1,
        }
    }
}

impl IndexerConfig {
    /// Reject settings the indexer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.sync_queue_limit == 0 {
            anyhow::bail!("sync queue limit must be at least 1");
        }
        if self.live_sync_threshold == 0 {
            anyhow::bail!("live sync threshold must be at least 1");
        }
        Ok(())
    }

    /// Override the staking contract from a hex string.
    pub fn with_staking_contract(mut self, s: &str) -> Result<Self> {
        self.staking_contract =
            parse_address(s).with_context(|| format!("Invalid staking contract address: {}", s))?;
        Ok(self)
    }
}
