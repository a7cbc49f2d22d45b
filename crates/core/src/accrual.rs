//! Interest accrual.
//!
//! Accrual advances the pool from `accrual_period` to `now` using simple
//! interest over the elapsed periods at the current borrow rate:
//!
//! ```text
//! interest_factor      = borrow_rate * (now - accrual_period)
//! interest_accumulated = interest_factor * total_borrows / WAD
//! total_borrows'       = total_borrows + interest_accumulated
//! total_reserves'      = total_reserves + reserve_factor * interest_accumulated / WAD
//! borrow_index'        = borrow_index + borrow_index * interest_factor / WAD
//! ```
//!
//! A second accrual in the same period is a no-op.

use alloy_primitives::U256;

use crate::error::{MarketError, Result};
use crate::math::{add, mul, w_mul_down};
use crate::pool::PoolState;
use crate::rate_model::InterestRateModel;

/// Outcome of advancing a pool to a later period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accrual {
    /// The pool as of `now`
    pub pool: PoolState,
    /// Cash held when the accrual ran
    pub cash_prior: U256,
    /// Per-period borrow rate applied over the elapsed periods
    pub borrow_rate: U256,
    /// Interest added to total borrows
    pub interest_accumulated: U256,
}

impl PoolState {
    /// Computes the pool state at `now` without mutating `self`.
    ///
    /// Returns `Ok(None)` when the pool already accrued in this period.
    ///
    /// # Errors
    ///
    /// - [`MarketError::InvalidPeriod`] if `now` is before the last accrual
    /// - [`MarketError::RateTooHigh`] if the model's rate exceeds `max_borrow_rate`
    /// - [`MarketError::Arithmetic`] on overflow
    pub fn accrue(
        &self,
        now: u64,
        cash: U256,
        model: &dyn InterestRateModel,
        max_borrow_rate: U256,
    ) -> Result<Option<Accrual>> {
        if now == self.accrual_period {
            return Ok(None);
        }
        let elapsed = now
            .checked_sub(self.accrual_period)
            .ok_or(MarketError::InvalidPeriod {
                now,
                last: self.accrual_period,
            })?;

        let borrow_rate = model.borrow_rate(cash, self.total_borrows, self.total_reserves)?;
        if borrow_rate > max_borrow_rate {
            return Err(MarketError::RateTooHigh {
                rate: borrow_rate,
                max: max_borrow_rate,
            });
        }

        let interest_factor = mul(borrow_rate, U256::from(elapsed))?;
        let interest_accumulated = w_mul_down(interest_factor, self.total_borrows)?;
        let total_borrows = add(self.total_borrows, interest_accumulated)?;
        let total_reserves = add(
            w_mul_down(self.reserve_factor, interest_accumulated)?,
            self.total_reserves,
        )?;
        let borrow_index = add(
            w_mul_down(interest_factor, self.borrow_index)?,
            self.borrow_index,
        )?;

        Ok(Some(Accrual {
            pool: PoolState {
                total_borrows,
                total_reserves,
                borrow_index,
                accrual_period: now,
                ..*self
            },
            cash_prior: cash,
            borrow_rate,
            interest_accumulated,
        }))
    }
}
