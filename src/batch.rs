//! Atomic write batch
//!
//! A batch collects every write of one block (records, ledger snapshot,
//! counters and the finalization checkpoint) and commits them as one
//! durable write. A record visible under two addresses is serialized once
//! and written under both keys.

use crate::error::IndexError;
use crate::keys;
use crate::records::{encode_u256, Account, AddressStats, FinalizationData, Record, WeekStats};
use crate::store::{encode_accounts, KvPair, Storage};
use alloy_primitives::{Address, B256, U256};

pub struct Batch {
    storage: Storage,
    ops: Vec<KvPair>,
}

impl Batch {
    pub(crate) fn new(storage: Storage) -> Self {
        Self {
            storage,
            ops: Vec::new(),
        }
    }

    /// Number of pending writes.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.ops.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push((key, value));
    }

    /// Add a record to an address's sequence at `index`.
    pub fn add<T: Record>(&mut self, record: &T, address: Address, index: u64) -> Result<(), IndexError> {
        let bytes = record.encode()?;
        self.add_serialized(T::PREFIX, bytes, address, index);
        Ok(())
    }

    /// Add already-serialized bytes to an address's sequence at `index`.
    pub fn add_serialized(&mut self, prefix: u8, bytes: Vec<u8>, address: Address, index: u64) {
        self.put(keys::sequence_key(prefix, address, index), bytes);
    }

    /// Add a record under `prefix || hash`.
    pub fn add_single_key<T: Record>(&mut self, record: &T, hash: B256) -> Result<(), IndexError> {
        let bytes = record.encode()?;
        self.add_serialized_single_key(T::PREFIX, bytes, hash);
        Ok(())
    }

    /// Add already-serialized bytes under `prefix || hash`.
    pub fn add_serialized_single_key(&mut self, prefix: u8, bytes: Vec<u8>, hash: B256) {
        self.put(keys::hash_key(prefix, hash), bytes);
    }

    /// Store the ledger snapshot. Callers pass accounts already sorted.
    pub fn save_accounts(&mut self, accounts: &[Account]) -> Result<(), IndexError> {
        let bytes = encode_accounts(accounts)?;
        self.put(keys::singleton_key(keys::ACCOUNTS_PREFIX), bytes);
        Ok(())
    }

    pub fn set_finalization_data(&mut self, data: &FinalizationData) -> Result<(), IndexError> {
        let bytes = data.encode()?;
        self.put(keys::singleton_key(FinalizationData::PREFIX), bytes);
        Ok(())
    }

    pub fn set_genesis_hash(&mut self, hash: B256) {
        self.put(keys::singleton_key(keys::GENESIS_HASH_PREFIX), hash.to_vec());
    }

    pub fn set_total_supply(&mut self, supply: U256) {
        self.put(
            keys::singleton_key(keys::TOTAL_SUPPLY_PREFIX),
            encode_u256(supply).to_vec(),
        );
    }

    pub fn set_address_stats(&mut self, address: Address, stats: &AddressStats) -> Result<(), IndexError> {
        let bytes = stats.encode()?;
        self.put(keys::address_key(AddressStats::PREFIX, address), bytes);
        Ok(())
    }

    pub fn update_week_stats(&mut self, stats: &WeekStats) -> Result<(), IndexError> {
        let bytes = stats.encode()?;
        self.put(stats.key(), bytes);
        Ok(())
    }

    /// Durably write everything. Failure is fatal for the caller.
    pub fn commit(self) -> Result<(), IndexError> {
        let Self { storage, ops } = self;
        tracing::trace!(writes = ops.len(), "committing batch");
        storage.commit_ops(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CallData, DecodedValue, TransactionRecord, TransactionType};
    use alloy_primitives::address;
    use tempfile::TempDir;

    fn sample(hash: B256) -> TransactionRecord {
        TransactionRecord {
            hash,
            from: address!("0000000000000000000000000000000000000001"),
            to: Some(address!("0000000000000000000000000000000000000002")),
            value: U256::from(20u64),
            gas_price: U256::from(1u64),
            gas_used: 1,
            gas_cost: U256::from(1u64),
            status: true,
            input: vec![1, 2, 3],
            tx_type: TransactionType::ContractCall,
            block_number: 7,
            timestamp: 70,
            calldata: None,
        }
    }

    #[test]
    fn test_nothing_is_visible_before_commit() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();

        let mut batch = storage.batch();
        batch
            .set_finalization_data(&FinalizationData { period: 3, dag_count: 4, trx_count: 5 })
            .unwrap();
        batch.set_total_supply(U256::from(1_000u64));
        assert_eq!(batch.len(), 2);
        assert!(storage.get_finalization_data().unwrap().is_none());

        batch.commit().unwrap();
        assert_eq!(
            storage.get_finalization_data().unwrap(),
            Some(FinalizationData { period: 3, dag_count: 4, trx_count: 5 })
        );
        assert_eq!(storage.get_total_supply().unwrap(), U256::from(1_000u64));
    }

    #[test]
    fn test_serialize_once_write_twice() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let hash = B256::repeat_byte(7);
        let record = sample(hash);
        let from = record.from;
        let to = record.to.unwrap();

        let bytes = record.encode().unwrap();
        let mut batch = storage.batch();
        batch.add_serialized(TransactionRecord::PREFIX, bytes.clone(), from, 0);
        batch.add_serialized(TransactionRecord::PREFIX, bytes.clone(), to, 0);
        batch.add_serialized_single_key(keys::TX_BY_HASH_PREFIX, bytes, hash);
        batch
            .add_single_key(
                &CallData { name: "f".to_string(), params: vec![DecodedValue::Scalar("1".to_string())] },
                hash,
            )
            .unwrap();
        batch
            .set_address_stats(from, &AddressStats { transactions_count: 1, ..Default::default() })
            .unwrap();
        batch
            .set_address_stats(to, &AddressStats { transactions_count: 1, ..Default::default() })
            .unwrap();
        batch.commit().unwrap();

        assert_eq!(storage.get_transaction_by_hash(hash).unwrap(), Some(record.clone()));
        assert_eq!(storage.get_calldata(hash).unwrap().unwrap().name, "f");
        for address in [from, to] {
            let page = storage
                .get_page::<TransactionRecord>(address, 0, 10, crate::store::Order::NewestFirst)
                .unwrap();
            assert_eq!(page.items, vec![record.clone()]);
        }
    }

    #[test]
    fn test_genesis_hash_roundtrip() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        let mut batch = storage.batch();
        batch.set_genesis_hash(B256::repeat_byte(0x42));
        batch.commit().unwrap();
        assert_eq!(storage.genesis_hash().unwrap(), Some(B256::repeat_byte(0x42)));
    }
}
