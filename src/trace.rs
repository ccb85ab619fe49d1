//! Internal transactions from execution traces
//!
//! Traces come from `trace_replayBlockTransactions` and are flat: entry 0
//! mirrors the top-level call and is skipped, every further entry becomes
//! one internal transaction.
//!
//! A `delegatecall` runs the callee's code in the caller's balance
//! context, so it is recorded but never moves value.

use crate::error::IndexError;
use crate::records::TransactionType;
use crate::types::{TraceEntry, TransactionTrace};
use alloy_primitives::{Address, U256};

/// One nested call extracted from a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCall {
    pub from: Address,
    /// Callee, created contract, or self-destruct beneficiary
    pub to: Option<Address>,
    pub value: U256,
    /// Gas used by this entry alone
    pub gas_used: u64,
    pub input: Vec<u8>,
    pub tx_type: TransactionType,
    /// Whether the ledger should move `value` from `from` to `to`.
    pub moves_value: bool,
}

/// Extract the internal calls of one transaction, in trace order.
///
/// Traces with zero or one entry have no internal calls.
pub fn internal_calls(trace: &TransactionTrace) -> Result<Vec<InternalCall>, IndexError> {
    trace.trace.iter().skip(1).map(internal_call).collect()
}

fn internal_call(entry: &TraceEntry) -> Result<InternalCall, IndexError> {
    let action = &entry.action;
    let gas_used = entry
        .result
        .as_ref()
        .and_then(|r| r.gas_used)
        .unwrap_or(0);

    match entry.r#type.as_str() {
        "suicide" | "selfdestruct" => {
            let from = action
                .address
                .ok_or_else(|| IndexError::decode("trace", "self-destruct without address"))?;
            Ok(InternalCall {
                from,
                to: action.refund_address,
                value: action.balance,
                gas_used,
                input: Vec::new(),
                tx_type: TransactionType::InternalTransfer,
                moves_value: action.refund_address.is_some(),
            })
        }
        "create" | "create2" => {
            let from = action
                .from
                .ok_or_else(|| IndexError::decode("trace", "create without sender"))?;
            let input = action.init.clone().unwrap_or_default();
            let to = entry.result.as_ref().and_then(|r| r.address);
            Ok(InternalCall {
                from,
                to,
                value: action.value,
                gas_used,
                tx_type: TransactionType::internal(&entry.r#type, &input),
                input,
                moves_value: to.is_some(),
            })
        }
        "call" => {
            let from = action
                .from
                .ok_or_else(|| IndexError::decode("trace", "call without sender"))?;
            let input = action.input.clone().unwrap_or_default();
            let delegate = action.call_type.as_deref() == Some("delegatecall");
            Ok(InternalCall {
                from,
                to: action.to,
                value: action.value,
                gas_used,
                tx_type: TransactionType::internal(&entry.r#type, &input),
                input,
                moves_value: !delegate && action.to.is_some(),
            })
        }
        other => Err(IndexError::decode("trace", format!("unknown entry type {}", other))),
    }
}
