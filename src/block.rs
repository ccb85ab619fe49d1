//! Block processing pipeline
//!
//! A [`BlockContext`] applies one period to the ledger and collects all of
//! its writes in a single [`Batch`]. Nothing reaches storage unless the
//! whole period succeeds; the finalization checkpoint is committed in the
//! same batch.
//!
//! The ledger is mutated in place. After a failed period the caller must
//! reload it from storage before applying anything else.

use crate::batch::Batch;
use crate::config::IndexerConfig;
use crate::decode::{decode_call, decode_log};
use crate::error::IndexError;
use crate::fee::{author_fee_credit, calculate_fee};
use crate::keys;
use crate::ledger::{Delta, Ledger};
use crate::records::{
    iso_week, AddressStats, DagRecord, FinalizationData, InternalTransactions, LogRecord, PeriodRecord,
    Record, TransactionLogs, TransactionRecord, TransactionType,
};
use crate::store::Storage;
use crate::trace::internal_calls;
use crate::types::{BlockData, ChainConfig, ChainTransaction, PeriodBlock, TransactionTrace};
use alloy_primitives::{Address, B256, U256};
use std::collections::HashMap;

pub struct BlockContext<'a> {
    storage: &'a Storage,
    ledger: &'a mut Ledger,
    config: &'a IndexerConfig,
    chain: ChainConfig,
    batch: Batch,
    stats: HashMap<Address, AddressStats>,
    finalization: FinalizationData,
    total_supply: U256,
    fees: U256,
}

impl<'a> BlockContext<'a> {
    pub fn new(
        storage: &'a Storage,
        ledger: &'a mut Ledger,
        config: &'a IndexerConfig,
        chain: ChainConfig,
    ) -> Result<Self, IndexError> {
        Ok(Self {
            batch: storage.batch(),
            finalization: storage.get_finalization_data()?.unwrap_or_default(),
            total_supply: storage.get_total_supply()?,
            storage,
            ledger,
            config,
            chain,
            stats: HashMap::new(),
            fees: U256::ZERO,
        })
    }

    /// Apply one period and commit it.
    ///
    /// Returns the number of DAG blocks and transactions of the period.
    pub fn process(mut self, block: &BlockData) -> Result<(u64, u64), IndexError> {
        let period = &block.period;
        check_counts(block)?;

        self.save_dags(block)?;
        self.save_period(block)?;
        self.update_week_stats(period)?;

        for (i, tx) in block.transactions.iter().enumerate() {
            self.process_transaction(tx, block.traces.as_ref().and_then(|t| t.get(i)), period)?;
        }

        if let Some(credit) = author_fee_credit(period.number, self.fees, &self.chain) {
            self.ledger.add_to_balance(period.author, Delta::Credit(credit))?;
        }

        let dag_count = block.dags.len() as u64;
        let trx_count = block.transactions.len() as u64;
        self.finalization = FinalizationData {
            period: period.number,
            dag_count: self.finalization.dag_count + dag_count,
            trx_count: self.finalization.trx_count + trx_count,
        };
        self.commit()?;
        Ok((dag_count, trx_count))
    }

    fn stats_mut(&mut self, address: Address) -> Result<&mut AddressStats, IndexError> {
        if !self.stats.contains_key(&address) {
            let stats = self.storage.get_address_stats(address)?;
            self.stats.insert(address, stats);
        }
        self.stats
            .get_mut(&address)
            .ok_or_else(|| IndexError::Storage(anyhow::anyhow!("address stats cache miss")))
    }

    fn save_dags(&mut self, block: &BlockData) -> Result<(), IndexError> {
        for dag in &block.dags {
            let record = DagRecord {
                hash: dag.hash,
                level: dag.level,
                timestamp: dag.timestamp,
                transaction_count: dag.transactions.len() as u64,
            };
            let index = self.stats_mut(dag.sender)?.next_dag_index();
            self.batch.add(&record, dag.sender, index)?;
        }
        Ok(())
    }

    fn save_period(&mut self, block: &BlockData) -> Result<(), IndexError> {
        let period = &block.period;
        let record = PeriodRecord {
            number: period.number,
            hash: period.hash,
            timestamp: period.timestamp,
            transaction_count: block.transactions.len() as u64,
        };
        let index = self.stats_mut(period.author)?.next_period_index();
        self.batch.add(&record, period.author, index)
    }

    fn update_week_stats(&mut self, period: &PeriodBlock) -> Result<(), IndexError> {
        let (year, week) = iso_week(period.timestamp).ok_or_else(|| {
            IndexError::decode(
                format!("period {}", period.number),
                format!("timestamp {} out of range", period.timestamp),
            )
        })?;
        let mut stats = self.storage.get_week_stats(year, week)?;
        stats.add_period(period.author);
        self.batch.update_week_stats(&stats)
    }

    /// Write a transaction under its sender and receiver, and by hash for
    /// top-level contract calls.
    pub(crate) fn save_transaction(&mut self, record: &TransactionRecord) -> Result<(), IndexError> {
        let bytes = record.encode()?;

        let index = self.stats_mut(record.from)?.next_transaction_index();
        self.batch
            .add_serialized(TransactionRecord::PREFIX, bytes.clone(), record.from, index);

        if let Some(to) = record.to.filter(|to| *to != record.from) {
            let index = self.stats_mut(to)?.next_transaction_index();
            self.batch
                .add_serialized(TransactionRecord::PREFIX, bytes.clone(), to, index);
        }

        if !record.tx_type.is_internal() && !record.input.is_empty() {
            self.batch
                .add_serialized_single_key(keys::TX_BY_HASH_PREFIX, bytes, record.hash);
        }
        tracing::trace!(hash = %record.hash, tx_type = ?record.tx_type, "saved transaction");
        Ok(())
    }

    fn process_transaction(
        &mut self,
        tx: &ChainTransaction,
        trace: Option<&TransactionTrace>,
        period: &PeriodBlock,
    ) -> Result<(), IndexError> {
        let receiver = if tx.is_contract_creation() {
            tx.contract_address
        } else {
            tx.to
        };
        let calldata = decode_call(self.config.staking_contract, tx.to, &tx.input);
        let gas_cost = calculate_fee(tx.gas_used, tx.gas_price);

        let record = TransactionRecord {
            hash: tx.hash,
            from: tx.from,
            to: receiver,
            value: tx.value,
            gas_price: tx.gas_price,
            gas_used: tx.gas_used,
            gas_cost,
            status: tx.status,
            input: tx.input.clone(),
            tx_type: TransactionType::top_level(tx.is_contract_creation(), &tx.input),
            block_number: period.number,
            timestamp: period.timestamp,
            calldata: calldata.clone(),
        };
        self.save_transaction(&record)?;
        if let Some(calldata) = &calldata {
            self.batch.add_single_key(calldata, tx.hash)?;
        }

        // fees are charged whether or not the transaction succeeded
        self.ledger.add_to_balance(tx.from, Delta::Debit(gas_cost))?;
        self.fees = self.fees.saturating_add(gas_cost);

        if !tx.status {
            return Ok(());
        }

        let Some(receiver) = receiver else {
            return Err(IndexError::decode(
                format!("transaction {}", tx.hash),
                "successful contract creation without contract address",
            ));
        };
        self.ledger.update_balances(tx.from, receiver, tx.value)?;

        self.process_logs(tx)?;

        if let Some(trace) = trace.filter(|t| t.trace.len() > 1) {
            self.process_internal_transactions(&record, trace)?;
        }
        Ok(())
    }

    fn process_logs(&mut self, tx: &ChainTransaction) -> Result<(), IndexError> {
        if tx.logs.is_empty() {
            return Ok(());
        }

        let mut stored = TransactionLogs::default();
        let mut events = Vec::new();
        for (i, log) in tx.logs.iter().enumerate() {
            if let Some(event) = decode_log(log, self.config.staking_contract)? {
                events.push(event);
            }
            stored.data.push(LogRecord {
                address: log.address,
                topics: log.topics.clone(),
                data: log.data.clone(),
                log_index: log.log_index.unwrap_or(i as u64),
                transaction_hash: tx.hash,
                transaction_index: tx.transaction_index,
            });
        }
        let issued = self.ledger.apply_events(&events, self.config.staking_contract)?;
        self.total_supply = self.total_supply.saturating_add(issued);
        self.batch.add_single_key(&stored, tx.hash)
    }

    fn process_internal_transactions(
        &mut self,
        parent: &TransactionRecord,
        trace: &TransactionTrace,
    ) -> Result<(), IndexError> {
        let mut bundle = InternalTransactions::default();
        for call in internal_calls(trace)? {
            let record = TransactionRecord {
                hash: parent.hash,
                from: call.from,
                to: call.to,
                value: call.value,
                gas_price: parent.gas_price,
                gas_used: call.gas_used,
                gas_cost: calculate_fee(call.gas_used, parent.gas_price),
                status: parent.status,
                input: call.input.clone(),
                tx_type: call.tx_type,
                block_number: parent.block_number,
                timestamp: parent.timestamp,
                calldata: None,
            };
            self.save_transaction(&record)?;

            if let (true, Some(to)) = (call.moves_value, call.to) {
                self.ledger.update_balances(call.from, to, call.value)?;
            }
            bundle.data.push(record);
        }
        self.batch.add_single_key(&bundle, parent.hash)
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut Ledger {
        self.ledger
    }

    /// Commit a freshly seeded index: checkpoint at period zero with no
    /// counted transactions.
    pub(crate) fn commit_genesis(mut self, hash: B256, total_supply: U256) -> Result<(), IndexError> {
        self.batch.set_genesis_hash(hash);
        self.total_supply = total_supply;
        self.finalization = FinalizationData::default();
        self.commit()
    }

    fn commit(self) -> Result<(), IndexError> {
        let Self {
            ledger,
            mut batch,
            stats,
            finalization,
            total_supply,
            ..
        } = self;

        batch.save_accounts(&ledger.sorted())?;
        for (address, stats) in &stats {
            batch.set_address_stats(*address, stats)?;
        }
        batch.set_total_supply(total_supply);
        batch.set_finalization_data(&finalization)?;
        batch.commit()
    }
}

/// The node-reported transaction list, the fetched transactions and (when
/// requested) the traces must line up one to one.
fn check_counts(block: &BlockData) -> Result<(), IndexError> {
    let reported = block.period.transactions.len();
    let fetched = block.transactions.len();
    let traces = block.traces.as_ref().map_or(fetched, Vec::len);
    if fetched != reported || traces != fetched {
        tracing::warn!(
            period = block.period.number,
            reported,
            fetched,
            traces,
            "Transaction count mismatch"
        );
        return Err(IndexError::CountMismatch {
            period: block.period.number,
            reported,
            fetched,
            traces,
        });
    }
    Ok(())
}
