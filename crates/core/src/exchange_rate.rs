//! Share token <-> underlying conversions.
//!
//! ```text
//! exchange_rate = (cash + total_borrows - total_reserves) * WAD / total_supply
//! ```
//!
//! While no shares exist the pool's `initial_exchange_rate` applies. Both
//! conversion directions default to rounding in the pool's favor: minted shares
//! and paid-out underlying round down, burned shares for a fixed payout round up.

use alloy_primitives::U256;

use crate::math::{add, mul_div, mul_div_down, sub, MathError, RoundingDirection, WAD};
use crate::pool::PoolState;

impl PoolState {
    /// Underlying value of the pool net of reserves.
    pub fn net_assets(&self, cash: U256) -> Result<U256, MathError> {
        sub(add(cash, self.total_borrows)?, self.total_reserves)
    }

    /// Exchange rate from the last accrued totals. No side effects.
    pub fn exchange_rate_stored(&self, cash: U256) -> Result<U256, MathError> {
        if self.total_supply.is_zero() {
            return Ok(self.initial_exchange_rate);
        }
        mul_div_down(self.net_assets(cash)?, WAD, self.total_supply)
    }
}

/// `amount * WAD / exchange_rate` in the requested direction.
pub fn shares_for_underlying(
    amount: U256,
    exchange_rate: U256,
    rounding: RoundingDirection,
) -> Result<U256, MathError> {
    mul_div(amount, WAD, exchange_rate, rounding)
}

/// `shares * exchange_rate / WAD`, rounded down.
pub fn underlying_for_shares(shares: U256, exchange_rate: U256) -> Result<U256, MathError> {
    mul_div_down(shares, exchange_rate, WAD)
}
