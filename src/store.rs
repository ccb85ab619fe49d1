//! Storage backend and read API
//!
//! The index lives in one ordered key space (see [`crate::keys`]). The
//! key-value engine sits behind the narrow [`KvBackend`] trait; the
//! RocksDB implementation uses the default column family only.
//!
//! Writes go through [`Batch`](crate::batch::Batch), which commits all
//! writes of one block in a single durable write.

use crate::batch::Batch;
use crate::error::IndexError;
use crate::keys;
use crate::records::{
    decode_u256, encode_record, Account, AddressStats, CallData, FinalizationData, InternalTransactions,
    Paginated, Record, TransactionLogs, TransactionRecord, WeekStats,
};
use alloy_primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Number of entries fetched per backend scan while iterating.
const SCAN_CHUNK: usize = 256;

/// Key/value pair returned by a scan.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Minimal capabilities the index needs from a key-value engine.
pub trait KvBackend: Send + Sync {
    /// Get the value stored under a key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Apply all puts in one durable, atomic write.
    fn write(&self, ops: Vec<KvPair>) -> Result<()>;

    /// Up to `limit` entries with keys `>= start` that start with `prefix`,
    /// in ascending key order.
    fn scan_forward(&self, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<KvPair>>;

    /// Up to `limit` entries with keys `<= start` that start with `prefix`,
    /// in descending key order.
    fn scan_backward(&self, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<KvPair>>;

    /// Delete every key.
    fn clear(&self) -> Result<()>;
}

/// RocksDB-backed key-value engine.
pub struct RocksBackend {
    db: DB,
}

impl RocksBackend {
    /// Open or create a RocksDB database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).context("Failed to open RocksDB database")?;
        Ok(Self { db })
    }
}

impl KvBackend for RocksBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.db.get(key).context("Failed to read key")
    }

    fn write(&self, ops: Vec<KvPair>) -> Result<()> {
        let mut batch = WriteBatch::default();
        for (key, value) in ops {
            batch.put(key, value);
        }
        let mut opts = WriteOptions::default();
        opts.set_sync(true);
        self.db
            .write_opt(batch, &opts)
            .context("Failed to write batch")
    }

    fn scan_forward(&self, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<KvPair>> {
        let iter = self.db.iterator(IteratorMode::From(start, Direction::Forward));
        collect_prefixed(iter, prefix, limit)
    }

    fn scan_backward(&self, prefix: &[u8], start: &[u8], limit: usize) -> Result<Vec<KvPair>> {
        let iter = self.db.iterator(IteratorMode::From(start, Direction::Reverse));
        collect_prefixed(iter, prefix, limit)
    }

    fn clear(&self) -> Result<()> {
        let mut batch = WriteBatch::default();
        for item in self.db.iterator(IteratorMode::Start) {
            let (key, _) = item.context("Failed to read iterator")?;
            batch.delete(key);
        }
        self.db.write(batch).context("Failed to clear database")
    }
}

fn collect_prefixed<I>(iter: I, prefix: &[u8], limit: usize) -> Result<Vec<KvPair>>
where
    I: Iterator<Item = std::result::Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>>,
{
    let mut out = Vec::new();
    for item in iter {
        if out.len() >= limit {
            break;
        }
        let (key, value) = item.context("Failed to read iterator")?;
        if !key.starts_with(prefix) {
            break;
        }
        out.push((key.into_vec(), value.into_vec()));
    }
    Ok(out)
}

/// Iteration order of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    NewestFirst,
    OldestFirst,
}

/// One page of a per-address sequence or of the holders list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Offset of the first item
    pub start: u64,
    /// Offset after the last item
    pub end: u64,
    /// Length of the whole sequence
    pub total: u64,
    pub has_next: bool,
}

impl<T> Page<T> {
    fn new(items: Vec<T>, from: u64, total: u64) -> Self {
        let end = from + items.len() as u64;
        Self {
            items,
            start: from,
            end,
            total,
            has_next: end < total,
        }
    }
}

/// Handle to the index. Cloning shares the backend and the commit lock.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn KvBackend>,
    commit_lock: Arc<Mutex<()>>,
}

impl Storage {
    /// Open the RocksDB-backed index at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::with_backend(Arc::new(RocksBackend::open(path)?)))
    }

    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self {
            backend,
            commit_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Start an empty write batch.
    pub fn batch(&self) -> Batch {
        Batch::new(self.clone())
    }

    /// Durably write a batch's operations, one commit at a time.
    pub(crate) fn commit_ops(&self, ops: Vec<KvPair>) -> Result<(), IndexError> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| IndexError::Storage(anyhow::anyhow!("commit lock poisoned")))?;
        self.backend.write(ops).map_err(IndexError::Storage)
    }

    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexError> {
        self.backend.get(key).map_err(IndexError::Storage)
    }

    fn get_record<T: Record>(&self, key: &[u8]) -> Result<Option<T>, IndexError> {
        self.get_raw(key)?.map(|bytes| T::decode(&bytes)).transpose()
    }

    /// Persisted ledger snapshot, sorted by descending balance.
    pub fn get_accounts(&self) -> Result<Vec<Account>, IndexError> {
        match self.get_raw(&keys::singleton_key(keys::ACCOUNTS_PREFIX))? {
            Some(bytes) => postcard::from_bytes(&bytes).map_err(|e| IndexError::decode("accounts", e)),
            None => Ok(Vec::new()),
        }
    }

    /// Balance of one address from the persisted snapshot.
    pub fn get_account(&self, address: Address) -> Result<Option<Account>, IndexError> {
        Ok(self
            .get_accounts()?
            .into_iter()
            .find(|account| account.address == address))
    }

    pub fn get_finalization_data(&self) -> Result<Option<FinalizationData>, IndexError> {
        self.get_record(&keys::singleton_key(keys::FINALIZATION_PREFIX))
    }

    pub fn genesis_hash(&self) -> Result<Option<B256>, IndexError> {
        match self.get_raw(&keys::singleton_key(keys::GENESIS_HASH_PREFIX))? {
            Some(bytes) if bytes.len() == 32 => Ok(Some(B256::from_slice(&bytes))),
            Some(bytes) => Err(IndexError::decode(
                "genesis hash",
                format!("expected 32 bytes, got {}", bytes.len()),
            )),
            None => Ok(None),
        }
    }

    pub fn genesis_hash_exists(&self) -> Result<bool, IndexError> {
        Ok(self.genesis_hash()?.is_some())
    }

    pub fn get_total_supply(&self) -> Result<U256, IndexError> {
        match self.get_raw(&keys::singleton_key(keys::TOTAL_SUPPLY_PREFIX))? {
            Some(bytes) => decode_u256(&bytes).map_err(|e| IndexError::decode("total supply", e)),
            None => Ok(U256::ZERO),
        }
    }

    /// Counters of one address; all zero if it was never indexed.
    pub fn get_address_stats(&self, address: Address) -> Result<AddressStats, IndexError> {
        Ok(self
            .get_record(&keys::address_key(keys::ADDRESS_STATS_PREFIX, address))?
            .unwrap_or_default())
    }

    /// Periods of one ISO week; zero counters if none were indexed.
    pub fn get_week_stats(&self, year: i32, week: u32) -> Result<WeekStats, IndexError> {
        Ok(self
            .get_record(&keys::week_key(WeekStats::PREFIX, year, week))?
            .unwrap_or_else(|| WeekStats::new(year, week)))
    }

    pub fn get_transaction_by_hash(&self, hash: B256) -> Result<Option<TransactionRecord>, IndexError> {
        self.get_record(&keys::hash_key(keys::TX_BY_HASH_PREFIX, hash))
    }

    pub fn get_internal_transactions(&self, hash: B256) -> Result<InternalTransactions, IndexError> {
        Ok(self
            .get_record(&keys::hash_key(InternalTransactions::PREFIX, hash))?
            .unwrap_or_default())
    }

    pub fn get_transaction_logs(&self, hash: B256) -> Result<TransactionLogs, IndexError> {
        Ok(self
            .get_record(&keys::hash_key(TransactionLogs::PREFIX, hash))?
            .unwrap_or_default())
    }

    pub fn get_calldata(&self, hash: B256) -> Result<Option<CallData>, IndexError> {
        self.get_record(&keys::hash_key(CallData::PREFIX, hash))
    }

    /// Visit an address's records in ascending index order, starting at
    /// `from_index`. Iteration stops when `f` returns `false`.
    pub fn for_each<T, F>(&self, address: Address, from_index: u64, mut f: F) -> Result<(), IndexError>
    where
        T: Record,
        F: FnMut(u64, T) -> bool,
    {
        let prefix = keys::address_prefix(T::PREFIX, address);
        let mut next = from_index;
        loop {
            let start = keys::sequence_key(T::PREFIX, address, next);
            let chunk = self
                .backend
                .scan_forward(&prefix, &start, SCAN_CHUNK)
                .map_err(IndexError::Storage)?;
            let len = chunk.len();
            for (key, value) in chunk {
                let index = sequence_index(&key)?;
                if !f(index, T::decode(&value)?) {
                    return Ok(());
                }
                match index.checked_add(1) {
                    Some(n) => next = n,
                    None => return Ok(()),
                }
            }
            if len < SCAN_CHUNK {
                return Ok(());
            }
        }
    }

    /// Visit an address's records in descending index order, starting at
    /// `from_index`. Iteration stops when `f` returns `false`.
    pub fn for_each_backwards<T, F>(&self, address: Address, from_index: u64, mut f: F) -> Result<(), IndexError>
    where
        T: Record,
        F: FnMut(u64, T) -> bool,
    {
        let prefix = keys::address_prefix(T::PREFIX, address);
        let mut next = from_index;
        loop {
            let start = keys::sequence_key(T::PREFIX, address, next);
            let chunk = self
                .backend
                .scan_backward(&prefix, &start, SCAN_CHUNK)
                .map_err(IndexError::Storage)?;
            let len = chunk.len();
            for (key, value) in chunk {
                let index = sequence_index(&key)?;
                if !f(index, T::decode(&value)?) {
                    return Ok(());
                }
                match index.checked_sub(1) {
                    Some(n) => next = n,
                    None => return Ok(()),
                }
            }
            if len < SCAN_CHUNK {
                return Ok(());
            }
        }
    }

    /// Page through an address's records.
    ///
    /// `from` is an offset from the newest record for [`Order::NewestFirst`]
    /// and from the oldest one for [`Order::OldestFirst`].
    pub fn get_page<T: Paginated>(
        &self,
        address: Address,
        from: u64,
        count: u64,
        order: Order,
    ) -> Result<Page<T>, IndexError> {
        let total = T::total(&self.get_address_stats(address)?);
        if from >= total || count == 0 {
            return Ok(Page::new(Vec::new(), from.min(total), total));
        }

        let limit = count.min(total - from) as usize;
        let mut items = Vec::with_capacity(limit);
        let mut collect = |_: u64, record: T| {
            items.push(record);
            items.len() < limit
        };
        match order {
            Order::NewestFirst => self.for_each_backwards(address, total - 1 - from, &mut collect)?,
            Order::OldestFirst => self.for_each(address, from, &mut collect)?,
        }
        Ok(Page::new(items, from, total))
    }

    /// Page through holders, richest first.
    pub fn get_holders_page(&self, from: u64, count: u64) -> Result<Page<Account>, IndexError> {
        let accounts = self.get_accounts()?;
        let total = accounts.len() as u64;
        let items: Vec<Account> = accounts
            .into_iter()
            .skip(from as usize)
            .take(count as usize)
            .collect();
        Ok(Page::new(items, from.min(total), total))
    }

    /// Delete everything.
    pub fn clean(&self) -> Result<(), IndexError> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| IndexError::Storage(anyhow::anyhow!("commit lock poisoned")))?;
        self.backend.clear().map_err(IndexError::Storage)
    }
}

fn sequence_index(key: &[u8]) -> Result<u64, IndexError> {
    keys::decode_sequence_index(key)
        .ok_or_else(|| IndexError::decode("sequence key", format!("malformed key {}", hex::encode(key))))
}

/// Serialize the ledger snapshot.
pub(crate) fn encode_accounts(accounts: &[Account]) -> Result<Vec<u8>, IndexError> {
    encode_record(accounts, "accounts")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{DagRecord, TransactionType};
    use alloy_primitives::address;
    use tempfile::TempDir;

    fn open_storage() -> (TempDir, Storage) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, storage)
    }

    fn transfer(n: u64, from: Address, to: Address) -> TransactionRecord {
        TransactionRecord {
            hash: B256::with_last_byte(n as u8),
            from,
            to: Some(to),
            value: U256::from(n),
            gas_price: U256::from(1u64),
            gas_used: 21_000,
            gas_cost: U256::from(21_000u64),
            status: true,
            input: Vec::new(),
            tx_type: TransactionType::Transfer,
            block_number: n,
            timestamp: 1_000 + n,
            calldata: None,
        }
    }

    /// Write `n` transactions to `addr`'s history, with block numbers 0..n.
    fn seed_history(storage: &Storage, addr: Address, n: u64) {
        let mut batch = storage.batch();
        let mut stats = AddressStats::default();
        let other = address!("00000000000000000000000000000000000000ff");
        for i in 0..n {
            let index = stats.next_transaction_index();
            batch.add(&transfer(i, addr, other), addr, index).unwrap();
        }
        batch.set_address_stats(addr, &stats).unwrap();
        batch.commit().unwrap();
    }

    #[test]
    fn test_missing_values() {
        let (_dir, storage) = open_storage();
        let addr = address!("0000000000000000000000000000000000000001");
        assert!(storage.get_accounts().unwrap().is_empty());
        assert!(storage.get_finalization_data().unwrap().is_none());
        assert!(!storage.genesis_hash_exists().unwrap());
        assert_eq!(storage.get_total_supply().unwrap(), U256::ZERO);
        assert_eq!(storage.get_address_stats(addr).unwrap(), AddressStats::default());
        assert!(storage.get_transaction_by_hash(B256::ZERO).unwrap().is_none());
        assert!(storage.get_internal_transactions(B256::ZERO).unwrap().data.is_empty());
        assert!(storage.get_calldata(B256::ZERO).unwrap().is_none());
    }

    #[test]
    fn test_pagination_newest_first_splits_without_overlap() {
        let (_dir, storage) = open_storage();
        let addr = address!("0000000000000000000000000000000000000001");
        let n = 5;
        seed_history(&storage, addr, 2 * n - 1);

        let first = storage
            .get_page::<TransactionRecord>(addr, 0, n, Order::NewestFirst)
            .unwrap();
        let second = storage
            .get_page::<TransactionRecord>(addr, n, n, Order::NewestFirst)
            .unwrap();

        assert_eq!(first.items.len() as u64, n);
        assert!(first.has_next);
        assert_eq!(second.items.len() as u64, n - 1);
        assert!(!second.has_next);
        assert_eq!((second.start, second.end, second.total), (5, 9, 9));

        let blocks: Vec<u64> = first
            .items
            .iter()
            .chain(second.items.iter())
            .map(|tx| tx.block_number)
            .collect();
        assert_eq!(blocks, vec![8, 7, 6, 5, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_pagination_oldest_first() {
        let (_dir, storage) = open_storage();
        let addr = address!("0000000000000000000000000000000000000001");
        seed_history(&storage, addr, 4);

        let page = storage
            .get_page::<TransactionRecord>(addr, 1, 2, Order::OldestFirst)
            .unwrap();
        let blocks: Vec<u64> = page.items.iter().map(|tx| tx.block_number).collect();
        assert_eq!(blocks, vec![1, 2]);
        assert!(page.has_next);

        let past_end = storage
            .get_page::<TransactionRecord>(addr, 10, 2, Order::OldestFirst)
            .unwrap();
        assert!(past_end.items.is_empty());
        assert!(!past_end.has_next);
    }

    #[test]
    fn test_pagination_does_not_leak_into_neighbouring_address() {
        let (_dir, storage) = open_storage();
        let a = address!("0000000000000000000000000000000000000001");
        let b = address!("0000000000000000000000000000000000000002");
        seed_history(&storage, a, 3);
        seed_history(&storage, b, 2);

        let page = storage
            .get_page::<TransactionRecord>(b, 0, 10, Order::OldestFirst)
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|tx| tx.from == b));

        let empty = storage
            .get_page::<DagRecord>(a, 0, 10, Order::NewestFirst)
            .unwrap();
        assert_eq!(empty.total, 0);
    }

    #[test]
    fn test_for_each_spans_multiple_scan_chunks() {
        let (_dir, storage) = open_storage();
        let addr = address!("0000000000000000000000000000000000000001");
        let n = SCAN_CHUNK as u64 + 10;
        seed_history(&storage, addr, n);

        let mut forward = Vec::new();
        storage
            .for_each::<TransactionRecord, _>(addr, 0, |index, _| {
                forward.push(index);
                true
            })
            .unwrap();
        assert_eq!(forward, (0..n).collect::<Vec<_>>());

        let mut backward = Vec::new();
        storage
            .for_each_backwards::<TransactionRecord, _>(addr, n - 1, |index, _| {
                backward.push(index);
                true
            })
            .unwrap();
        assert_eq!(backward, (0..n).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_holders_page_and_clean() {
        let (_dir, storage) = open_storage();
        let accounts = vec![
            Account { address: address!("0000000000000000000000000000000000000001"), balance: U256::from(30u64) },
            Account { address: address!("0000000000000000000000000000000000000002"), balance: U256::from(20u64) },
            Account { address: address!("0000000000000000000000000000000000000003"), balance: U256::from(10u64) },
        ];
        let mut batch = storage.batch();
        batch.save_accounts(&accounts).unwrap();
        batch.set_genesis_hash(B256::repeat_byte(0xab));
        batch.commit().unwrap();

        let page = storage.get_holders_page(1, 5).unwrap();
        assert_eq!(page.items, accounts[1..].to_vec());
        assert!(!page.has_next);
        assert_eq!(
            storage.get_account(accounts[0].address).unwrap(),
            Some(accounts[0].clone())
        );

        storage.clean().unwrap();
        assert!(storage.get_accounts().unwrap().is_empty());
        assert!(storage.genesis_hash().unwrap().is_none());
    }
}
