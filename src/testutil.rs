//! Scripted in-memory chain for tests.

use crate::rpc::{ChainClient, HeadSubscription};
use crate::types::{
    BlockData, BlockHeader, ChainStats, ChainTransaction, EventLog, GenesisConfig, PeriodBlock,
    TransactionTrace,
};
use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct MockChain {
    pub version: u64,
    pub genesis: GenesisConfig,
    pub blocks: Mutex<HashMap<u64, BlockData>>,
    pub latest: Mutex<u64>,
    pub stats: Mutex<Option<ChainStats>>,
    /// Remaining failures per period number
    pub failures: Mutex<HashMap<u64, u32>>,
    /// Artificial latency per period number
    pub delays: HashMap<u64, Duration>,
    /// Every period fetch attempt, in call order
    pub fetch_log: Mutex<Vec<u64>>,
    /// Heads handed out by the next subscription
    pub heads: Mutex<Vec<u64>>,
    /// Remaining scripted failures of `get_version`
    pub version_failures: Mutex<u32>,
    /// Error delivered by the next subscription, which then stays open
    pub subscription_error: Mutex<Option<String>>,
    /// Number of subscriptions opened so far
    pub subscriptions: Mutex<u32>,
    held_heads: Mutex<Option<mpsc::Sender<BlockHeader>>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            version: 1,
            ..Default::default()
        }
    }

    pub fn insert(&self, block: BlockData) {
        let number = block.period.number;
        self.blocks.lock().unwrap().insert(number, block);
        let mut latest = self.latest.lock().unwrap();
        *latest = (*latest).max(number);
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetch_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_version(&self) -> Result<u64> {
        {
            let mut failures = self.version_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("scripted connection failure");
            }
        }
        Ok(self.version)
    }

    async fn get_genesis(&self) -> Result<GenesisConfig> {
        Ok(self.genesis.clone())
    }

    async fn get_block_by_number(&self, number: u64) -> Result<BlockData> {
        self.fetch_log.lock().unwrap().push(number);
        if let Some(delay) = self.delays.get(&number) {
            tokio::time::sleep(*delay).await;
        }
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("scripted failure for period {}", number);
                }
            }
        }
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown period {}", number))
    }

    async fn get_latest_period(&self) -> Result<u64> {
        Ok(*self.latest.lock().unwrap())
    }

    async fn get_chain_stats(&self) -> Result<ChainStats> {
        (*self.stats.lock().unwrap()).ok_or_else(|| anyhow::anyhow!("method not found"))
    }

    async fn subscribe_new_heads(&self) -> Result<HeadSubscription> {
        *self.subscriptions.lock().unwrap() += 1;
        let heads: Vec<u64> = std::mem::take(&mut *self.heads.lock().unwrap());
        let (heads_tx, heads_rx) = mpsc::channel(heads.len().max(1));
        let (errors_tx, errors_rx) = mpsc::channel(1);
        for number in heads {
            heads_tx.try_send(BlockHeader { number })?;
        }
        if let Some(message) = self.subscription_error.lock().unwrap().take() {
            errors_tx
                .try_send(anyhow::anyhow!(message))
                .map_err(|_| anyhow::anyhow!("error channel full"))?;
            *self.held_heads.lock().unwrap() = Some(heads_tx);
        }
        // a closed head stream without an error ends the live loop
        Ok(HeadSubscription::new(heads_rx, errors_rx))
    }
}

pub fn addr(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn hash(period: u64, index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&period.to_be_bytes());
    bytes[24..].copy_from_slice(&index.to_be_bytes());
    B256::from(bytes)
}

/// Plain value transfer.
pub fn transfer(hash: B256, from: Address, to: Address, value: u64, fee: u64, status: bool) -> ChainTransaction {
    ChainTransaction {
        hash,
        from,
        to: Some(to),
        value: U256::from(value),
        gas_price: U256::from(1u64),
        gas_used: fee,
        input: Vec::new(),
        status,
        contract_address: None,
        logs: Vec::<EventLog>::new(),
        transaction_index: 0,
    }
}

/// Period with the given transactions and no traces requested.
pub fn block(number: u64, author: Address, transactions: Vec<ChainTransaction>) -> BlockData {
    let mut data = block_with_traces(number, author, transactions, Vec::new());
    data.traces = None;
    data
}

pub fn block_with_traces(
    number: u64,
    author: Address,
    transactions: Vec<ChainTransaction>,
    traces: Vec<TransactionTrace>,
) -> BlockData {
    BlockData {
        period: PeriodBlock {
            number,
            hash: hash(number, u64::MAX),
            timestamp: 1_700_000_000 + number,
            author,
            transactions: transactions.iter().map(|tx| tx.hash).collect(),
        },
        dags: Vec::new(),
        transactions,
        traces: Some(traces),
    }
}
