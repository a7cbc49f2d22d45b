//! Per-account share balances, borrow snapshots and allowances.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use serde::Serialize;

use crate::math::{mul_div_down, MathError};

/// A borrower's debt as of the borrow index at their last interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BorrowSnapshot {
    /// Debt including interest at the time of the snapshot
    pub principal: U256,
    /// Borrow index when the snapshot was taken
    pub interest_index: U256,
}

impl BorrowSnapshot {
    /// Current debt: `principal * borrow_index / interest_index`.
    pub fn balance(&self, borrow_index: U256) -> Result<U256, MathError> {
        if self.principal.is_zero() {
            return Ok(U256::ZERO);
        }
        mul_div_down(self.principal, borrow_index, self.interest_index)
    }
}

/// Account-level storage for one market. Missing entries read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountBook {
    shares: HashMap<Address, U256>,
    borrows: HashMap<Address, BorrowSnapshot>,
    allowances: HashMap<(Address, Address), U256>,
}

impl AccountBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shares(&self, account: Address) -> U256 {
        self.shares.get(&account).copied().unwrap_or_default()
    }

    pub fn set_shares(&mut self, account: Address, shares: U256) {
        if shares.is_zero() {
            self.shares.remove(&account);
        } else {
            self.shares.insert(account, shares);
        }
    }

    pub fn borrow_snapshot(&self, account: Address) -> BorrowSnapshot {
        self.borrows.get(&account).copied().unwrap_or_default()
    }

    pub fn set_borrow_snapshot(&mut self, account: Address, snapshot: BorrowSnapshot) {
        if snapshot.principal.is_zero() {
            self.borrows.remove(&account);
        } else {
            self.borrows.insert(account, snapshot);
        }
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_allowance(&mut self, owner: Address, spender: Address, amount: U256) {
        if amount.is_zero() {
            self.allowances.remove(&(owner, spender));
        } else {
            self.allowances.insert((owner, spender), amount);
        }
    }

    /// Accounts holding a nonzero share balance.
    pub fn holders(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.shares.iter()
    }

    /// Accounts with outstanding debt.
    pub fn borrowers(&self) -> impl Iterator<Item = (&Address, &BorrowSnapshot)> {
        self.borrows.iter()
    }
}
