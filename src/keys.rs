//! Key encoding utilities
//!
//! All records share one ordered key space. Every key starts with a
//! single-byte prefix naming the record type, followed by one of:
//!
//! - nothing, for global singletons (ledger snapshot, checkpoint, ...)
//! - a 20-byte address and a zero-padded decimal sequence index, for
//!   per-address history
//! - a 32-byte hash, for records looked up by transaction hash
//!
//! The sequence index is written as fixed-width decimal so that
//! lexicographic key order equals numeric order inside one address range.

use alloy_primitives::{Address, B256};

/// Ledger snapshot (all accounts, sorted by balance).
pub const ACCOUNTS_PREFIX: u8 = b'a';
/// Decoded call parameters keyed by transaction hash.
pub const CALLDATA_PREFIX: u8 = b'c';
/// DAG blocks per sender.
pub const DAG_PREFIX: u8 = b'd';
/// Finalization checkpoint.
pub const FINALIZATION_PREFIX: u8 = b'f';
/// Genesis block hash.
pub const GENESIS_HASH_PREFIX: u8 = b'g';
/// Top-level transactions keyed by hash.
pub const TX_BY_HASH_PREFIX: u8 = b'h';
/// Internal transaction bundles keyed by parent transaction hash.
pub const INTERNAL_TXS_PREFIX: u8 = b'i';
/// Event logs keyed by transaction hash.
pub const LOGS_PREFIX: u8 = b'l';
/// Periods per block author.
pub const PERIOD_PREFIX: u8 = b'p';
/// Total supply.
pub const TOTAL_SUPPLY_PREFIX: u8 = b's';
/// Periods per ISO week.
pub const WEEK_STATS_PREFIX: u8 = b'w';
/// Transactions per address.
pub const TRANSACTION_PREFIX: u8 = b't';
/// Per-address counters.
pub const ADDRESS_STATS_PREFIX: u8 = b'x';

/// Width of the decimal sequence index.
pub const INDEX_WIDTH: usize = 20;

/// Encode a singleton key.
///
/// Format: prefix byte
/// Total length: 1 byte
pub fn singleton_key(prefix: u8) -> Vec<u8> {
    vec![prefix]
}

/// Encode the common prefix of one address's sequence.
///
/// Format: prefix byte + address (20 bytes)
/// Total length: 21 bytes
pub fn address_prefix(prefix: u8, addr: Address) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 20 + INDEX_WIDTH);
    key.push(prefix);
    key.extend_from_slice(addr.as_slice());
    key
}

/// Encode a per-address sequence key.
///
/// Format: prefix byte + address (20 bytes) + index (20 ASCII digits)
/// Total length: 41 bytes
pub fn sequence_key(prefix: u8, addr: Address, index: u64) -> Vec<u8> {
    let mut key = address_prefix(prefix, addr);
    key.extend_from_slice(format!("{:0width$}", index, width = INDEX_WIDTH).as_bytes());
    key
}

/// Decode the sequence index from a per-address sequence key.
pub fn decode_sequence_index(key: &[u8]) -> Option<u64> {
    if key.len() != 1 + 20 + INDEX_WIDTH {
        return None;
    }
    std::str::from_utf8(&key[21..]).ok()?.parse().ok()
}

/// Encode a single-key-by-hash key.
///
/// Format: prefix byte + hash (32 bytes)
/// Total length: 33 bytes
pub fn hash_key(prefix: u8, hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(prefix);
    key.extend_from_slice(hash.as_slice());
    key
}

/// Encode an address-keyed singleton (address stats).
///
/// Format: prefix byte + address (20 bytes)
/// Total length: 21 bytes
pub fn address_key(prefix: u8, addr: Address) -> Vec<u8> {
    address_prefix(prefix, addr)
}

/// Encode a week key.
///
/// Format: prefix byte + ISO year (4 bytes, big-endian) + ISO week (4 bytes, big-endian)
/// Total length: 9 bytes
pub fn week_key(prefix: u8, year: i32, week: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(prefix);
    key.extend_from_slice(&year.to_be_bytes());
    key.extend_from_slice(&week.to_be_bytes());
    key
}
