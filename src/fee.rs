//! Gas fee calculation utilities
//!
//! Fees are charged to the sender of every transaction, successful or not.
//! Before the fee-distribution hardfork the fees collected in a period are
//! credited to the period's author; afterwards on-chain logic pays them out.

use crate::types::{ChainConfig, Receipt, RpcTransaction};
use alloy_primitives::U256;

/// Gas price actually paid by a transaction.
///
/// Priority order:
/// 1. `effective_gas_price` from the receipt, when the node reports it
/// 2. `gas_price` declared by the transaction
/// 3. zero
pub fn effective_gas_price(tx: &RpcTransaction, receipt: &Receipt) -> U256 {
    receipt
        .effective_gas_price
        .or(tx.gas_price)
        .unwrap_or(U256::ZERO)
}

/// Calculate the total fee paid for a transaction.
///
/// Fee = gas_used * gas_price
pub fn calculate_fee(gas_used: u64, gas_price: U256) -> U256 {
    U256::from(gas_used).saturating_mul(gas_price)
}

/// Amount to credit to the period author, if any.
///
/// Periods strictly below the hardfork block credit the collected fees;
/// a zero hardfork block means fees are never credited.
pub fn author_fee_credit(period: u64, collected: U256, chain: &ChainConfig) -> Option<U256> {
    (period < chain.fee_hardfork_block && !collected.is_zero()).then_some(collected)
}
