//! Aggregate state of a single lending pool.

use alloy_primitives::U256;
use serde::Serialize;

use crate::math::WAD;

/// Aggregate accounting for one market.
///
/// Accrual and the ledger operations produce a new `PoolState` and commit it
/// in one write; a failed operation never leaves a half-updated copy behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolState {
    /// Share tokens outstanding
    pub total_supply: U256,
    /// Underlying owed by all borrowers, including accrued interest
    pub total_borrows: U256,
    /// Underlying set aside for the protocol
    pub total_reserves: U256,
    /// Cumulative interest index, starts at WAD and never decreases
    pub borrow_index: U256,
    /// Period of the last accrual
    pub accrual_period: u64,
    /// Fraction of interest routed to reserves (WAD-scaled)
    pub reserve_factor: U256,
    /// Exchange rate used while no shares exist
    pub initial_exchange_rate: U256,
}

impl PoolState {
    /// A freshly initialized pool: no shares, no borrows, index at WAD.
    pub fn new(initial_exchange_rate: U256, reserve_factor: U256, period: u64) -> Self {
        Self {
            total_supply: U256::ZERO,
            total_borrows: U256::ZERO,
            total_reserves: U256::ZERO,
            borrow_index: WAD,
            accrual_period: period,
            reserve_factor,
            initial_exchange_rate,
        }
    }
}
