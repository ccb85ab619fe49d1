//! JSON-RPC client for the chain node
//!
//! [`ChainClient`] is everything the indexer needs from a node.
//! [`RpcClient`] implements it over HTTP JSON-RPC; the new-heads
//! subscription is a polling task feeding a pair of channels.

use crate::types::{
    BlockData, BlockHeader, ChainStats, ChainTransaction, DagBlock, GenesisConfig, PeriodBlock, Receipt,
    RpcTransaction, TransactionTrace,
};
use alloy_primitives::B256;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Capacity of the subscription channels.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Stream of finalized period headers plus a stream of subscription
/// errors. Dropping it stops the feeding task.
pub struct HeadSubscription {
    pub heads: mpsc::Receiver<BlockHeader>,
    pub errors: mpsc::Receiver<anyhow::Error>,
    task: Option<JoinHandle<()>>,
}

impl HeadSubscription {
    pub fn new(heads: mpsc::Receiver<BlockHeader>, errors: mpsc::Receiver<anyhow::Error>) -> Self {
        Self {
            heads,
            errors,
            task: None,
        }
    }

    fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }
}

impl Drop for HeadSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Node operations used by the indexer.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Protocol version spoken by the node.
    async fn get_version(&self) -> Result<u64>;

    /// Genesis object (initial balances, validators, hardforks).
    async fn get_genesis(&self) -> Result<GenesisConfig>;

    /// Everything needed to apply one period.
    async fn get_block_by_number(&self, number: u64) -> Result<BlockData>;

    /// Number of the latest finalized period.
    async fn get_latest_period(&self) -> Result<u64>;

    /// Cumulative counters, for consistency checks.
    async fn get_chain_stats(&self) -> Result<ChainStats>;

    /// Subscribe to newly finalized periods.
    async fn subscribe_new_heads(&self) -> Result<HeadSubscription>;
}

/// JSON-RPC client over HTTP.
#[derive(Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    poll_interval: Duration,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String, poll_interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            poll_interval,
        }
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            anyhow::bail!("RPC error from {}: {}", method, error);
        }

        // Extract result
        json.get("result")
            .cloned()
            .with_context(|| format!("{} response missing 'result' field", method))
    }

    /// Call and deserialize, treating `null` as an error.
    async fn call_typed<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self.call(method, params).await?;
        if result.is_null() {
            anyhow::bail!("{} returned null", method);
        }
        serde_json::from_value(result).with_context(|| format!("Failed to deserialize {} result", method))
    }

    async fn get_period(&self, number: u64) -> Result<PeriodBlock> {
        self.call_typed("eth_getBlockByNumber", json!([format!("0x{:x}", number), false]))
            .await
            .with_context(|| format!("Failed to get period {}", number))
    }

    async fn get_period_dags(&self, number: u64) -> Result<Vec<DagBlock>> {
        let result = self
            .call("taraxa_getPeriodDagBlocks", json!([format!("0x{:x}", number)]))
            .await?;
        if result.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(result).context("Failed to deserialize DAG blocks")
    }

    /// Transaction merged with its receipt; `None` if the node does not know it.
    async fn get_transaction(&self, hash: B256, position: u64) -> Result<Option<ChainTransaction>> {
        let hash_str = format!("0x{:x}", hash);
        let tx = self.call("eth_getTransactionByHash", json!([hash_str])).await?;
        let receipt = self.call("eth_getTransactionReceipt", json!([hash_str])).await?;
        if tx.is_null() || receipt.is_null() {
            tracing::warn!("Node returned no transaction or receipt for {}", hash_str);
            return Ok(None);
        }
        let tx: RpcTransaction = serde_json::from_value(tx).context("Failed to deserialize transaction")?;
        let receipt: Receipt = serde_json::from_value(receipt).context("Failed to deserialize receipt")?;
        Ok(Some(ChainTransaction::from_parts(tx, receipt, position)))
    }

    async fn get_traces(&self, number: u64) -> Result<Vec<TransactionTrace>> {
        self.call_typed(
            "trace_replayBlockTransactions",
            json!([format!("0x{:x}", number), ["trace"]]),
        )
        .await
        .with_context(|| format!("Failed to get traces of period {}", number))
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn get_version(&self) -> Result<u64> {
        let result = self.call("taraxa_protocolVersion", json!([])).await?;
        match &result {
            Value::Number(n) => n.as_u64().context("Protocol version is not a u64"),
            Value::String(s) => crate::types::parse_quantity_u64(s),
            other => anyhow::bail!("Unexpected protocol version: {}", other),
        }
    }

    async fn get_genesis(&self) -> Result<GenesisConfig> {
        self.call_typed("taraxa_getConfig", json!([])).await
    }

    async fn get_block_by_number(&self, number: u64) -> Result<BlockData> {
        let period = self.get_period(number).await?;
        let dags = self.get_period_dags(number).await?;

        let fetched = try_join_all(
            period
                .transactions
                .iter()
                .enumerate()
                .map(|(i, hash)| self.get_transaction(*hash, i as u64)),
        )
        .await?;
        let transactions: Vec<ChainTransaction> = fetched.into_iter().flatten().collect();

        let traces = if period.transactions.is_empty() {
            None
        } else {
            Some(self.get_traces(number).await?)
        };

        Ok(BlockData {
            period,
            dags,
            transactions,
            traces,
        })
    }

    async fn get_latest_period(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number = result.as_str().context("Block number is not a string")?;
        crate::types::parse_quantity_u64(number)
    }

    async fn get_chain_stats(&self) -> Result<ChainStats> {
        self.call_typed("taraxa_getChainStats", json!([])).await
    }

    async fn subscribe_new_heads(&self) -> Result<HeadSubscription> {
        let (heads_tx, heads_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (errors_tx, errors_rx) = mpsc::channel(1);
        let client = self.clone();

        let task = tokio::spawn(async move {
            let mut last_seen: Option<u64> = None;
            loop {
                match client.get_latest_period().await {
                    Ok(number) if last_seen.map_or(true, |last| number > last) => {
                        last_seen = Some(number);
                        if heads_tx.send(BlockHeader { number }).await.is_err() {
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = errors_tx.send(e.context("New heads polling failed")).await;
                        return;
                    }
                }
                tokio::time::sleep(client.poll_interval).await;
            }
        });

        Ok(HeadSubscription::new(heads_rx, errors_rx).with_task(task))
    }
}
