//! In-memory account ledger
//!
//! Balances are kept in insertion order while a block is applied and only
//! sorted (descending balance) when the ledger is persisted.

use crate::decode::StakingEvent;
use crate::error::LedgerError;
use crate::records::Account;
use alloy_primitives::{Address, U256};
use std::collections::HashMap;

/// Signed balance change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    Credit(U256),
    Debit(U256),
}

#[derive(Debug, Clone, Default)]
pub struct Ledger {
    accounts: Vec<Account>,
    index: HashMap<Address, usize>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from a persisted snapshot.
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        let index = accounts
            .iter()
            .enumerate()
            .map(|(i, account)| (account.address, i))
            .collect();
        Self { accounts, index }
    }

    /// Look up an account. `None` means the address was never touched,
    /// which is different from a zero balance.
    pub fn find_balance(&self, address: Address) -> Option<&Account> {
        self.index.get(&address).map(|&i| &self.accounts[i])
    }

    /// Balance of an address, zero if absent.
    pub fn balance_of(&self, address: Address) -> U256 {
        self.find_balance(address)
            .map(|account| account.balance)
            .unwrap_or(U256::ZERO)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Sum of all balances.
    pub fn total(&self) -> U256 {
        self.accounts
            .iter()
            .fold(U256::ZERO, |sum, account| sum.saturating_add(account.balance))
    }

    /// Apply a delta, creating the account if it does not exist yet.
    ///
    /// The ledger is left untouched when the delta fails.
    pub fn add_to_balance(&mut self, address: Address, delta: Delta) -> Result<(), LedgerError> {
        let current = self.balance_of(address);
        let updated = match delta {
            Delta::Credit(amount) => current
                .checked_add(amount)
                .ok_or(LedgerError::Overflow { address })?,
            Delta::Debit(amount) => {
                current
                    .checked_sub(amount)
                    .ok_or(LedgerError::Overdraft {
                        address,
                        balance: current,
                        amount,
                    })?
            }
        };

        match self.index.get(&address) {
            Some(&i) => self.accounts[i].balance = updated,
            None => {
                self.index.insert(address, self.accounts.len());
                self.accounts.push(Account {
                    address,
                    balance: updated,
                });
            }
        }
        Ok(())
    }

    /// Move `value` from `from` to `to`.
    pub fn update_balances(&mut self, from: Address, to: Address, value: U256) -> Result<(), LedgerError> {
        self.add_to_balance(from, Delta::Debit(value))?;
        if let Err(e) = self.add_to_balance(to, Delta::Credit(value)) {
            // undo the debit so the pair stays atomic
            self.add_to_balance(from, Delta::Credit(value))?;
            return Err(e);
        }
        Ok(())
    }

    /// Apply the balance effect of one staking event.
    ///
    /// Returns the amount of newly issued tokens, which the caller adds to
    /// the total supply.
    pub fn apply_event(&mut self, event: &StakingEvent, staking_contract: Address) -> Result<U256, LedgerError> {
        match *event {
            // value already moved by the payable call or kept inside the contract
            StakingEvent::Delegated { .. }
            | StakingEvent::Undelegated { .. }
            | StakingEvent::UndelegateCancelled { .. }
            | StakingEvent::Redelegated { .. } => Ok(U256::ZERO),
            StakingEvent::UndelegateConfirmed { account, amount, .. } => {
                self.update_balances(staking_contract, account, amount)?;
                Ok(U256::ZERO)
            }
            StakingEvent::RewardsClaimed { account, amount, .. }
            | StakingEvent::CommissionRewardsClaimed { account, amount, .. } => {
                self.add_to_balance(account, Delta::Credit(amount))?;
                Ok(amount)
            }
        }
    }

    /// Apply a batch of events in order, returning the total issuance.
    pub fn apply_events(&mut self, events: &[StakingEvent], staking_contract: Address) -> Result<U256, LedgerError> {
        let mut issued = U256::ZERO;
        for event in events {
            issued = issued.saturating_add(self.apply_event(event, staking_contract)?);
        }
        Ok(issued)
    }

    /// Accounts sorted by descending balance, ties broken by address.
    pub fn sorted(&self) -> Vec<Account> {
        let mut accounts = self.accounts.clone();
        accounts.sort_by(|a, b| b.balance.cmp(&a.balance).then(a.address.cmp(&b.address)));
        accounts
    }
}
