//! Record types for the index
//!
//! These structs represent the data stored in the index.
//! They use postcard for binary serialization, which is compact and deterministic.

use crate::error::IndexError;
use crate::keys;
use alloy_primitives::{Address, B256, U256};
use chrono::{DateTime, Datelike, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record stored under a fixed key prefix.
pub trait Record: Serialize + DeserializeOwned {
    const PREFIX: u8;
    /// Human-readable name used in error messages.
    const NAME: &'static str;

    fn encode(&self) -> Result<Vec<u8>, IndexError> {
        encode_record(self, Self::NAME)
    }

    fn decode(bytes: &[u8]) -> Result<Self, IndexError> {
        postcard::from_bytes(bytes).map_err(|e| IndexError::decode(Self::NAME, e))
    }
}

/// A record kept as a per-address sequence, with its length tracked in
/// [`AddressStats`].
pub trait Paginated: Record {
    fn total(stats: &AddressStats) -> u64;
}

/// Serialize any value with postcard, mapping failures to a fatal error.
pub fn encode_record<T: Serialize + ?Sized>(
    value: &T,
    what: &'static str,
) -> Result<Vec<u8>, IndexError> {
    postcard::to_allocvec(value).map_err(|source| IndexError::Encode { what, source })
}

/// Kind of an indexed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Transfer,
    ContractCall,
    ContractCreation,
    InternalTransfer,
    InternalContractCall,
    InternalContractCreation,
}

impl TransactionType {
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            Self::InternalTransfer | Self::InternalContractCall | Self::InternalContractCreation
        )
    }

    /// Classify a top-level transaction.
    pub fn top_level(creation: bool, input: &[u8]) -> Self {
        if creation {
            Self::ContractCreation
        } else if input.is_empty() {
            Self::Transfer
        } else {
            Self::ContractCall
        }
    }

    /// Classify an internal transaction from a trace entry type.
    pub fn internal(entry_type: &str, input: &[u8]) -> Self {
        match entry_type {
            "create" | "create2" => Self::InternalContractCreation,
            _ if input.is_empty() => Self::InternalTransfer,
            _ => Self::InternalContractCall,
        }
    }
}

/// One decoded call parameter: a scalar rendered as text, or a nested list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodedValue {
    Scalar(String),
    List(Vec<DecodedValue>),
}

/// Decoded call parameters of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallData {
    /// Function name, e.g. `delegate`
    pub name: String,
    /// Parameters in declaration order
    pub params: Vec<DecodedValue>,
}

impl Record for CallData {
    const PREFIX: u8 = keys::CALLDATA_PREFIX;
    const NAME: &'static str = "call data";
}

/// Indexed transaction, top-level or internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: B256,
    pub from: Address,
    /// Receiver; for contract creation the created contract
    pub to: Option<Address>,
    pub value: U256,
    pub gas_price: U256,
    pub gas_used: u64,
    /// Fee paid by the sender (gas used × gas price)
    pub gas_cost: U256,
    pub status: bool,
    pub input: Vec<u8>,
    pub tx_type: TransactionType,
    pub block_number: u64,
    /// Unix timestamp in seconds
    pub timestamp: u64,
    pub calldata: Option<CallData>,
}

impl Record for TransactionRecord {
    const PREFIX: u8 = keys::TRANSACTION_PREFIX;
    const NAME: &'static str = "transaction";
}

impl Paginated for TransactionRecord {
    fn total(stats: &AddressStats) -> u64 {
        stats.transactions_count
    }
}

/// Internal transactions derived from one top-level transaction's trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTransactions {
    pub data: Vec<TransactionRecord>,
}

impl Record for InternalTransactions {
    const PREFIX: u8 = keys::INTERNAL_TXS_PREFIX;
    const NAME: &'static str = "internal transactions";
}

/// Event log as stored under its transaction hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub log_index: u64,
    pub transaction_hash: B256,
    pub transaction_index: u64,
}

/// All logs of one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLogs {
    pub data: Vec<LogRecord>,
}

impl Record for TransactionLogs {
    const PREFIX: u8 = keys::LOGS_PREFIX;
    const NAME: &'static str = "transaction logs";
}

/// DAG block as recorded under its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagRecord {
    pub hash: B256,
    pub level: u64,
    pub timestamp: u64,
    pub transaction_count: u64,
}

impl Record for DagRecord {
    const PREFIX: u8 = keys::DAG_PREFIX;
    const NAME: &'static str = "dag block";
}

impl Paginated for DagRecord {
    fn total(stats: &AddressStats) -> u64 {
        stats.dags_count
    }
}

/// Finalized period as recorded under its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub number: u64,
    pub hash: B256,
    pub timestamp: u64,
    pub transaction_count: u64,
}

impl Record for PeriodRecord {
    const PREFIX: u8 = keys::PERIOD_PREFIX;
    const NAME: &'static str = "period";
}

impl Paginated for PeriodRecord {
    fn total(stats: &AddressStats) -> u64 {
        stats.periods_count
    }
}

/// Balance of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: U256,
}

/// Per-address sequence counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressStats {
    pub transactions_count: u64,
    pub dags_count: u64,
    pub periods_count: u64,
}

impl Record for AddressStats {
    const PREFIX: u8 = keys::ADDRESS_STATS_PREFIX;
    const NAME: &'static str = "address stats";
}

impl AddressStats {
    /// Reserve the next transaction index.
    pub fn next_transaction_index(&mut self) -> u64 {
        let index = self.transactions_count;
        self.transactions_count += 1;
        index
    }

    /// Reserve the next DAG index.
    pub fn next_dag_index(&mut self) -> u64 {
        let index = self.dags_count;
        self.dags_count += 1;
        index
    }

    /// Reserve the next period index.
    pub fn next_period_index(&mut self) -> u64 {
        let index = self.periods_count;
        self.periods_count += 1;
        index
    }
}

/// Finalization checkpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizationData {
    /// Last fully processed period
    pub period: u64,
    /// Cumulative DAG block count
    pub dag_count: u64,
    /// Cumulative transaction count (top-level, excluding genesis seeding)
    pub trx_count: u64,
}

impl Record for FinalizationData {
    const PREFIX: u8 = keys::FINALIZATION_PREFIX;
    const NAME: &'static str = "finalization data";
}

/// Periods finalized during one ISO week.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekStats {
    pub year: i32,
    pub week: u32,
    pub periods_count: u64,
    /// Periods per block author
    pub authors: BTreeMap<Address, u64>,
}

impl Record for WeekStats {
    const PREFIX: u8 = keys::WEEK_STATS_PREFIX;
    const NAME: &'static str = "week stats";
}

impl WeekStats {
    pub fn new(year: i32, week: u32) -> Self {
        Self {
            year,
            week,
            ..Default::default()
        }
    }

    pub fn key(&self) -> Vec<u8> {
        keys::week_key(Self::PREFIX, self.year, self.week)
    }

    pub fn add_period(&mut self, author: Address) {
        self.periods_count += 1;
        *self.authors.entry(author).or_default() += 1;
    }
}

/// ISO (year, week) of a unix timestamp in seconds, UTC.
pub fn iso_week(timestamp: u64) -> Option<(i32, u32)> {
    let secs = i64::try_from(timestamp).ok()?;
    let week = DateTime::<Utc>::from_timestamp(secs, 0)?.iso_week();
    Some((week.year(), week.week()))
}

/// Encode a U256 value as a fixed 32-byte big-endian byte array.
pub fn encode_u256(value: U256) -> [u8; 32] {
    value.to_be_bytes()
}

/// Decode a 32-byte big-endian byte array into a U256 value.
pub fn decode_u256(bytes: &[u8]) -> Result<U256, anyhow::Error> {
    if bytes.len() != 32 {
        anyhow::bail!("U256 encoding must be exactly 32 bytes, got {}", bytes.len());
    }
    Ok(U256::from_be_slice(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    fn sample_transaction() -> TransactionRecord {
        TransactionRecord {
            hash: b256!("31254d1bd2d5ae8f5bcedeb1e9042720c82348404db97993b6a34c25307fe771"),
            from: address!("0dc0d841f962759da25547c686fa440cf6c28c61"),
            to: Some(address!("00000000000000000000000000000000000000fe")),
            value: U256::MAX - U256::from(1u64),
            gas_price: U256::from(1_000_000_007u64),
            gas_used: 21_000,
            gas_cost: U256::from(21_000u64) * U256::from(1_000_000_007u64),
            status: true,
            input: vec![0x5c, 0x19, 0xa9, 0x5c],
            tx_type: TransactionType::ContractCall,
            block_number: 123,
            timestamp: 1_700_000_000,
            calldata: Some(CallData {
                name: "delegate".to_string(),
                params: vec![
                    DecodedValue::Scalar("0xed4d5f4f3641cbc056e466d15dbe2403e38056f8".to_string()),
                    DecodedValue::List(vec![DecodedValue::Scalar("1".to_string())]),
                ],
            }),
        }
    }

    #[test]
    fn test_transaction_record_roundtrip_full_precision() {
        let record = sample_transaction();
        let bytes = record.encode().unwrap();
        let decoded = TransactionRecord::decode(&bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.value, U256::MAX - U256::from(1u64));
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let err = FinalizationData::decode(&[0xff]).unwrap_err();
        assert!(matches!(err, IndexError::Decode { .. }));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_address_stats_indices_are_monotonic() {
        let mut stats = AddressStats::default();
        assert_eq!(stats.next_transaction_index(), 0);
        assert_eq!(stats.next_transaction_index(), 1);
        assert_eq!(stats.next_dag_index(), 0);
        assert_eq!(stats.next_period_index(), 0);
        assert_eq!(TransactionRecord::total(&stats), 2);
        assert_eq!(DagRecord::total(&stats), 1);
        assert_eq!(PeriodRecord::total(&stats), 1);
    }

    #[test]
    fn test_transaction_type_classification() {
        assert_eq!(TransactionType::top_level(false, &[]), TransactionType::Transfer);
        assert_eq!(TransactionType::top_level(false, &[1]), TransactionType::ContractCall);
        assert_eq!(TransactionType::top_level(true, &[1]), TransactionType::ContractCreation);
        assert_eq!(TransactionType::internal("call", &[]), TransactionType::InternalTransfer);
        assert_eq!(TransactionType::internal("call", &[1]), TransactionType::InternalContractCall);
        assert_eq!(
            TransactionType::internal("create", &[]),
            TransactionType::InternalContractCreation
        );
        assert!(TransactionType::InternalTransfer.is_internal());
        assert!(!TransactionType::Transfer.is_internal());
    }

    #[test]
    fn test_u256_encoding() {
        let encoded = encode_u256(U256::MAX);
        assert_eq!(decode_u256(&encoded).unwrap(), U256::MAX);
        assert_eq!(encode_u256(U256::ZERO), [0u8; 32]);
        assert!(decode_u256(&[0u8; 31]).is_err());
    }

    #[test]
    fn test_iso_week() {
        // Tuesday 2023-11-14
        assert_eq!(iso_week(1_700_000_000), Some((2023, 46)));
        // Friday 2021-01-01 still belongs to the last week of 2020
        assert_eq!(iso_week(1_609_459_200), Some((2020, 53)));
        assert_eq!(iso_week(u64::MAX), None);
    }

    #[test]
    fn test_week_stats_counts_authors() {
        let (a, b) = (
            address!("0000000000000000000000000000000000000001"),
            address!("0000000000000000000000000000000000000002"),
        );
        let mut stats = WeekStats::new(2023, 46);
        stats.add_period(a);
        stats.add_period(b);
        stats.add_period(a);
        assert_eq!(stats.periods_count, 3);
        assert_eq!(stats.authors[&a], 2);
        assert_eq!(WeekStats::decode(&stats.encode().unwrap()).unwrap(), stats);
        assert_eq!(stats.key(), keys::week_key(b'w', 2023, 46));
    }
}
