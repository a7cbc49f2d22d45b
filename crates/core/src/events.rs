//! Domain events emitted by committed ledger operations.

use alloy_primitives::{Address, U256};
use serde::Serialize;

use crate::error::MarketId;

/// Record of one committed state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MarketEvent {
    AccrueInterest {
        cash_prior: U256,
        interest_accumulated: U256,
        borrow_index: U256,
        total_borrows: U256,
    },
    Supply {
        supplier: Address,
        amount: U256,
        shares: U256,
    },
    Withdraw {
        withdrawer: Address,
        amount: U256,
        shares: U256,
    },
    Borrow {
        borrower: Address,
        amount: U256,
        account_borrows: U256,
        total_borrows: U256,
    },
    RepayBorrow {
        payer: Address,
        borrower: Address,
        amount: U256,
        account_borrows: U256,
        total_borrows: U256,
    },
    LiquidateBorrow {
        liquidator: Address,
        borrower: Address,
        repay_amount: U256,
        collateral_market: MarketId,
        seize_shares: U256,
    },
    /// Share movement. Mints come from and burns go to the zero address.
    Transfer {
        from: Address,
        to: Address,
        shares: U256,
    },
    Approval {
        owner: Address,
        spender: Address,
        amount: U256,
    },
    ReservesAdded {
        benefactor: Address,
        amount: U256,
        total_reserves: U256,
    },
    ReservesReduced {
        to: Address,
        amount: U256,
        total_reserves: U256,
    },
    NewReserveFactor {
        old: U256,
        new: U256,
    },
    NewInterestRateModel {
        old: String,
        new: String,
    },
}

impl MarketEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccrueInterest { .. } => "AccrueInterest",
            Self::Supply { .. } => "Supply",
            Self::Withdraw { .. } => "Withdraw",
            Self::Borrow { .. } => "Borrow",
            Self::RepayBorrow { .. } => "RepayBorrow",
            Self::LiquidateBorrow { .. } => "LiquidateBorrow",
            Self::Transfer { .. } => "Transfer",
            Self::Approval { .. } => "Approval",
            Self::ReservesAdded { .. } => "ReservesAdded",
            Self::ReservesReduced { .. } => "ReservesReduced",
            Self::NewReserveFactor { .. } => "NewReserveFactor",
            Self::NewInterestRateModel { .. } => "NewInterestRateModel",
        }
    }
}
