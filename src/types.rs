//! Chain JSON-RPC types
//!
//! Type definitions for periods, DAG blocks, transactions, receipts,
//! traces and the genesis object returned by the node, plus the merged
//! `BlockData` the pipeline consumes.

use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Finalized period header as returned by `eth_getBlockByNumber(n, false)`.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodBlock {
    /// Period number (hex string in JSON)
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub number: u64,

    /// Period block hash
    #[serde(deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    /// Unix timestamp in seconds (hex string in JSON)
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub timestamp: u64,

    /// Block producer
    #[serde(rename = "miner", deserialize_with = "deserialize_hex_address")]
    pub author: Address,

    /// Hashes of the transactions the node reports for this period
    #[serde(default, deserialize_with = "deserialize_hex_b256_vec")]
    pub transactions: Vec<B256>,
}

/// Header delivered by the new-heads subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
}

/// DAG block included in a period.
#[derive(Debug, Clone, Deserialize)]
pub struct DagBlock {
    #[serde(deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    #[serde(deserialize_with = "deserialize_hex_address")]
    pub sender: Address,

    #[serde(deserialize_with = "deserialize_quantity_u64")]
    pub level: u64,

    #[serde(deserialize_with = "deserialize_quantity_u64")]
    pub timestamp: u64,

    #[serde(default, deserialize_with = "deserialize_hex_b256_vec")]
    pub transactions: Vec<B256>,
}

/// Transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcTransaction {
    #[serde(deserialize_with = "deserialize_hex_b256")]
    pub hash: B256,

    #[serde(deserialize_with = "deserialize_hex_address")]
    pub from: Address,

    /// Recipient address (None for contract creation)
    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    #[serde(deserialize_with = "deserialize_hex_u256")]
    pub value: U256,

    #[serde(rename = "gasPrice", default, deserialize_with = "deserialize_hex_u256_opt")]
    pub gas_price: Option<U256>,

    /// Transaction input data ("0x" for simple transfers)
    #[serde(deserialize_with = "deserialize_hex_bytes")]
    pub input: Vec<u8>,

    #[serde(rename = "transactionIndex", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub transaction_index: Option<u64>,
}

/// Transaction receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct Receipt {
    /// Transaction status: 1 = success, 0 = failure (hex string in JSON)
    #[serde(deserialize_with = "deserialize_hex_u64")]
    pub status: u64,

    #[serde(rename = "gasUsed", deserialize_with = "deserialize_hex_u64")]
    pub gas_used: u64,

    /// Effective gas price, when the node reports one
    #[serde(rename = "effectiveGasPrice", default, deserialize_with = "deserialize_hex_u256_opt")]
    pub effective_gas_price: Option<U256>,

    /// Created contract, for contract creation transactions
    #[serde(rename = "contractAddress", default, deserialize_with = "deserialize_hex_address_opt")]
    pub contract_address: Option<Address>,

    /// Logs emitted during transaction execution (empty for reverted txs)
    #[serde(default)]
    pub logs: Vec<EventLog>,
}

impl Receipt {
    /// Check if the transaction succeeded.
    pub fn is_success(&self) -> bool {
        self.status == 1
    }
}

/// Log entry emitted by a contract during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventLog {
    /// Address of the contract that emitted the log
    #[serde(deserialize_with = "deserialize_hex_address")]
    pub address: Address,

    /// Indexed topics (topic0 = event signature, topics[1..] = indexed params)
    #[serde(default, deserialize_with = "deserialize_hex_b256_vec")]
    pub topics: Vec<B256>,

    /// Non-indexed event data
    #[serde(deserialize_with = "deserialize_hex_bytes")]
    pub data: Vec<u8>,

    #[serde(rename = "logIndex", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub log_index: Option<u64>,
}

/// Transaction merged with its receipt, in block order.
#[derive(Debug, Clone)]
pub struct ChainTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: U256,
    pub gas_used: u64,
    pub input: Vec<u8>,
    pub status: bool,
    pub contract_address: Option<Address>,
    pub logs: Vec<EventLog>,
    pub transaction_index: u64,
}

impl ChainTransaction {
    /// Merge a transaction with its receipt.
    ///
    /// The receipt's effective gas price wins over the transaction's
    /// declared gas price.
    pub fn from_parts(tx: RpcTransaction, receipt: Receipt, position: u64) -> Self {
        let gas_price = crate::fee::effective_gas_price(&tx, &receipt);
        Self {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            gas_price,
            gas_used: receipt.gas_used,
            input: tx.input,
            status: receipt.is_success(),
            contract_address: receipt.contract_address,
            logs: receipt.logs,
            transaction_index: tx.transaction_index.unwrap_or(position),
        }
    }

    /// Check if this is a contract creation transaction (to is None).
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// Trace of one transaction (`trace_replayBlockTransactions` with `["trace"]`).
///
/// Entry 0 is the top-level call itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionTrace {
    #[serde(default)]
    pub trace: Vec<TraceEntry>,
}

/// One node of a flattened call trace.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceEntry {
    pub action: TraceAction,

    #[serde(default)]
    pub result: Option<TraceResult>,

    /// call / create / suicide
    #[serde(rename = "type")]
    pub r#type: String,
}

/// Action part of a trace entry. Fields are optional because their
/// presence depends on the entry type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceAction {
    /// call / delegatecall / staticcall / callcode
    #[serde(rename = "callType", default)]
    pub call_type: Option<String>,

    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub from: Option<Address>,

    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub to: Option<Address>,

    /// Missing values are treated as zero.
    #[serde(default, deserialize_with = "deserialize_hex_u256_lenient")]
    pub value: U256,

    #[serde(default, deserialize_with = "deserialize_hex_bytes_opt")]
    pub input: Option<Vec<u8>>,

    #[serde(default, deserialize_with = "deserialize_hex_bytes_opt")]
    pub init: Option<Vec<u8>>,

    /// Self-destructed contract
    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub address: Option<Address>,

    /// Self-destruct beneficiary
    #[serde(rename = "refundAddress", default, deserialize_with = "deserialize_hex_address_opt")]
    pub refund_address: Option<Address>,

    /// Self-destructed balance
    #[serde(default, deserialize_with = "deserialize_hex_u256_lenient")]
    pub balance: U256,
}

/// Result part of a trace entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceResult {
    #[serde(rename = "gasUsed", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub gas_used: Option<u64>,

    /// Created contract, for create entries
    #[serde(default, deserialize_with = "deserialize_hex_address_opt")]
    pub address: Option<Address>,
}

/// Everything the pipeline needs to apply one period.
#[derive(Debug, Clone)]
pub struct BlockData {
    pub period: PeriodBlock,
    pub dags: Vec<DagBlock>,
    pub transactions: Vec<ChainTransaction>,
    /// One trace per transaction; `None` when traces were not requested
    pub traces: Option<Vec<TransactionTrace>>,
}

/// Counters reported by the node, used for consistency checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ChainStats {
    #[serde(rename = "pbft_period", deserialize_with = "deserialize_quantity_u64")]
    pub period: u64,

    #[serde(rename = "dag_blocks_executed", deserialize_with = "deserialize_quantity_u64")]
    pub dag_count: u64,

    #[serde(rename = "transactions_executed", deserialize_with = "deserialize_quantity_u64")]
    pub trx_count: u64,
}

/// Chain genesis object (`taraxa_getConfig`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenesisConfig {
    /// address -> balance (hex or decimal quantity)
    #[serde(default)]
    pub initial_balances: BTreeMap<String, String>,

    #[serde(default)]
    pub dpos: DposGenesis,

    #[serde(default)]
    pub hardforks: Hardforks,

    #[serde(default)]
    pub dag_genesis_block: DagGenesisBlock,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DposGenesis {
    #[serde(default)]
    pub initial_validators: Vec<GenesisValidator>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenesisValidator {
    pub address: String,

    /// delegator -> amount
    #[serde(default)]
    pub delegations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Hardforks {
    /// Fee distribution moved on-chain at this hardfork.
    #[serde(default)]
    pub magnolia_hf: HardforkBlock,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HardforkBlock {
    #[serde(default, deserialize_with = "deserialize_quantity_u64")]
    pub block_num: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DagGenesisBlock {
    #[serde(default, deserialize_with = "deserialize_quantity_u64")]
    pub timestamp: u64,
}

/// Chain parameters the pipeline depends on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainConfig {
    /// Periods below this number credit collected fees to the block author.
    pub fee_hardfork_block: u64,
}

impl GenesisConfig {
    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            fee_hardfork_block: self.hardforks.magnolia_hf.block_num,
        }
    }

    /// Parsed initial balances, ordered by address.
    pub fn balances(&self) -> Result<Vec<(Address, U256)>> {
        let mut out = Vec::with_capacity(self.initial_balances.len());
        for (addr, value) in &self.initial_balances {
            let addr = parse_address(addr)
                .with_context(|| format!("Invalid genesis balance address {}", addr))?;
            let value = parse_quantity_u256(value)
                .with_context(|| format!("Invalid genesis balance for {:?}", addr))?;
            out.push((addr, value));
        }
        out.sort_by_key(|(addr, _)| *addr);
        Ok(out)
    }

    /// Parsed initial delegations as (delegator, amount).
    pub fn delegations(&self) -> Result<Vec<(Address, U256)>> {
        let mut out = Vec::new();
        for validator in &self.dpos.initial_validators {
            for (delegator, amount) in &validator.delegations {
                let delegator = parse_address(delegator)
                    .with_context(|| format!("Invalid delegator address {}", delegator))?;
                let amount = parse_quantity_u256(amount).with_context(|| {
                    format!("Invalid delegation of {:?} to {}", delegator, validator.address)
                })?;
                out.push((delegator, amount));
            }
        }
        Ok(out)
    }
}

// Hex parsing helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Decode a hex string (with or without 0x prefix) into bytes.
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(pad_hex_string(s)).with_context(|| format!("Invalid hex string: {}", s))
}

/// Parse a hex string into a 20-byte address.
pub fn parse_address(s: &str) -> Result<Address> {
    let bytes = parse_hex_bytes(s)?;
    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }
    Ok(Address::from_slice(&bytes))
}

/// Parse a hex string into a 32-byte hash.
pub fn parse_hash(s: &str) -> Result<B256> {
    let bytes = parse_hex_bytes(s)?;
    if bytes.len() != 32 {
        anyhow::bail!("Hash must be 32 bytes (64 hex chars), got {} bytes", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

/// Parse a hex string into a U256 value.
pub fn parse_u256(s: &str) -> Result<U256> {
    let bytes = parse_hex_bytes(s)?;
    if bytes.len() > 32 {
        anyhow::bail!("U256 value too large (max 32 bytes), got {} bytes", bytes.len());
    }
    Ok(U256::from_be_slice(&bytes))
}

/// Parse a quantity written either as 0x-prefixed hex or as decimal.
pub fn parse_quantity_u256(s: &str) -> Result<U256> {
    let s = s.trim();
    if s.starts_with("0x") {
        parse_u256(s)
    } else {
        U256::from_str_radix(s, 10).with_context(|| format!("Invalid decimal quantity: {}", s))
    }
}

/// Parse a u64 quantity written either as 0x-prefixed hex or as decimal.
pub fn parse_quantity_u64(s: &str) -> Result<u64> {
    let s = s.trim();
    match s.strip_prefix("0x") {
        Some("") => Ok(0),
        Some(hex) => u64::from_str_radix(hex, 16).with_context(|| format!("Invalid hex quantity: {}", s)),
        None => s.parse().with_context(|| format!("Invalid decimal quantity: {}", s)),
    }
}

// Serde adapters

fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_quantity_u64(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_quantity_u64(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Quantity that may arrive as a JSON number or as a (hex or decimal) string.
#[derive(Deserialize)]
#[serde(untagged)]
enum Quantity {
    Number(u64),
    Text(String),
}

fn deserialize_quantity_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match Quantity::deserialize(deserializer)? {
        Quantity::Number(n) => Ok(n),
        Quantity::Text(s) => parse_quantity_u64(&s).map_err(serde::de::Error::custom),
    }
}

fn deserialize_hex_u256<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_u256(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_u256_opt<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_u256(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// null / missing / empty string ⇒ 0
fn deserialize_hex_u256_lenient<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_hex_u256_opt(deserializer)?.unwrap_or(U256::ZERO))
}

fn deserialize_hex_b256<'de, D>(deserializer: D) -> Result<B256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hash(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_b256_vec<'de, D>(deserializer: D) -> Result<Vec<B256>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default();
    items
        .iter()
        .map(|s| parse_hash(s).map_err(serde::de::Error::custom))
        .collect()
}

fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_address(&s).map_err(serde::de::Error::custom)
}

/// null / missing / empty string ⇒ None
fn deserialize_hex_address_opt<'de, D>(deserializer: D) -> Result<Option<Address>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if s.is_empty() || s == "0x" => Ok(None),
        Some(s) => parse_address(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_bytes(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_bytes_opt<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_hex_bytes(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}
