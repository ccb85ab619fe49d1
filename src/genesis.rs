//! Genesis seeding
//!
//! A fresh index starts from the chain's genesis object: every initial
//! balance becomes a synthetic transfer from the reserved sender
//! [`GENESIS_SENDER`], initial validator delegations move funds into the
//! staking contract, and the checkpoint is committed at period zero with
//! no counted transactions.

use crate::block::BlockContext;
use crate::config::IndexerConfig;
use crate::error::IndexError;
use crate::ledger::{Delta, Ledger};
use crate::records::{TransactionRecord, TransactionType};
use crate::store::Storage;
use crate::types::GenesisConfig;
use alloy_primitives::{keccak256, Address, B256, U256};

/// Sender of the synthetic genesis transactions.
pub const GENESIS_SENDER: Address = Address::ZERO;

/// Hash of the synthetic transaction crediting `address` at genesis.
pub fn genesis_transaction_hash(address: Address) -> B256 {
    keccak256(format!("GENESIS_{:#x}", address).as_bytes())
}

fn genesis_transaction(address: Address, value: U256, timestamp: u64) -> TransactionRecord {
    TransactionRecord {
        hash: genesis_transaction_hash(address),
        from: GENESIS_SENDER,
        to: Some(address),
        value,
        gas_price: U256::ZERO,
        gas_used: 0,
        gas_cost: U256::ZERO,
        status: true,
        input: Vec::new(),
        tx_type: TransactionType::Transfer,
        block_number: 0,
        timestamp,
        calldata: None,
    }
}

/// Seed an empty index from the genesis object and commit it.
///
/// `ledger` must be empty; it holds the seeded balances afterwards.
pub fn seed(
    storage: &Storage,
    ledger: &mut Ledger,
    config: &IndexerConfig,
    genesis: &GenesisConfig,
    genesis_hash: B256,
) -> Result<(), IndexError> {
    let balances = genesis
        .balances()
        .map_err(|e| IndexError::decode("genesis balances", format!("{:#}", e)))?;
    let delegations = genesis
        .delegations()
        .map_err(|e| IndexError::decode("genesis delegations", format!("{:#}", e)))?;
    let timestamp = genesis.dag_genesis_block.timestamp;

    let mut ctx = BlockContext::new(storage, ledger, config, genesis.chain_config())?;
    for (address, value) in &balances {
        ctx.save_transaction(&genesis_transaction(*address, *value, timestamp))?;
        ctx.ledger_mut().add_to_balance(*address, Delta::Credit(*value))?;
    }
    for (delegator, amount) in &delegations {
        ctx.ledger_mut()
            .update_balances(*delegator, config.staking_contract, *amount)?;
    }
    let supply = ctx.ledger_mut().total();
    ctx.commit_genesis(genesis_hash, supply)?;

    tracing::info!(
        accounts = balances.len(),
        delegations = delegations.len(),
        "Genesis: initial balances seeded"
    );
    Ok(())
}
