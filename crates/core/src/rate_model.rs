//! Utilization-based interest rate models.
//!
//! A rate model is a pure function from pool balances to a per-period borrow
//! rate. The supply rate follows from it: only the borrowed share of the pool
//! earns interest, and the reserve factor's cut of that interest never reaches
//! suppliers.
//!
//! # Jump rate curve
//!
//! ```text
//! utilization = borrows / (cash + borrows - reserves)
//!
//! If utilization <= kink:
//!     rate = base + multiplier * utilization
//! If utilization > kink:
//!     rate = base + multiplier * kink + jump_multiplier * (utilization - kink)
//! ```
//!
//! Both branches agree at `utilization == kink`, so the curve is continuous and
//! only its slope changes at the kink.
//!
//! # Example
//!
//! ```rust
//! use lendpool_rs_core::rate_model::{InterestRateModel, JumpRateModel};
//! use lendpool_rs_core::math::{DEFAULT_PERIODS_PER_YEAR, WAD};
//! use alloy_primitives::U256;
//!
//! // 2% base, 10% slope, 109% jump slope above 80% utilization
//! let model = JumpRateModel::from_annual(
//!     U256::from(20_000_000_000_000_000u64),
//!     U256::from(100_000_000_000_000_000u64),
//!     U256::from(1_090_000_000_000_000_000u64),
//!     U256::from(800_000_000_000_000_000u64),
//!     DEFAULT_PERIODS_PER_YEAR,
//! )
//! .unwrap();
//!
//! // An empty pool pays the base rate
//! let rate = model.borrow_rate(U256::ZERO, U256::ZERO, U256::ZERO).unwrap();
//! assert_eq!(rate, model.base_rate_per_period);
//! ```

use std::cmp::min;
use std::fmt;

use alloy_primitives::U256;

use crate::math::{add, div, mul, mul_div_down, sub, w_mul_down, MathError, WAD};

/// Maps pool balances to per-period rates (WAD-scaled).
pub trait InterestRateModel: fmt::Debug {
    /// Short name used in parameter-change events
    fn name(&self) -> &'static str;

    /// Periods per year the per-period rates were derived with
    fn periods_per_year(&self) -> u64;

    /// Per-period borrow rate for the given balances.
    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<U256, MathError>;

    /// Per-period supply rate for the given balances.
    fn supply_rate(
        &self,
        cash: U256,
        borrows: U256,
        reserves: U256,
        reserve_factor: U256,
    ) -> Result<U256, MathError> {
        let utilization = utilization(cash, borrows, reserves)?;
        let borrow_rate = self.borrow_rate(cash, borrows, reserves)?;
        supply_rate_from(utilization, borrow_rate, reserve_factor)
    }
}

/// Fraction of the pool currently lent out (WAD-scaled, clamped to `[0, WAD]`).
///
/// Zero when nothing is borrowed. Fails when `cash + borrows - reserves` is
/// zero or negative while borrows are outstanding.
pub fn utilization(cash: U256, borrows: U256, reserves: U256) -> Result<U256, MathError> {
    if borrows.is_zero() {
        return Ok(U256::ZERO);
    }
    let pool = sub(add(cash, borrows)?, reserves)?;
    Ok(min(mul_div_down(borrows, WAD, pool)?, WAD))
}

/// `utilization * borrow_rate * (WAD - reserve_factor) / WAD / WAD`
pub fn supply_rate_from(
    utilization: U256,
    borrow_rate: U256,
    reserve_factor: U256,
) -> Result<U256, MathError> {
    let one_minus_reserve_factor = sub(WAD, reserve_factor)?;
    let numerator = mul(mul(utilization, borrow_rate)?, one_minus_reserve_factor)?;
    div(div(numerator, WAD)?, WAD)
}

/// Converts an annual rate to a per-period rate, rounding down.
fn per_period(annual: U256, periods_per_year: u64) -> Result<U256, MathError> {
    div(annual, U256::from(periods_per_year))
}

/// Kinked rate model with a steeper slope above the kink utilization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpRateModel {
    /// Rate at zero utilization
    pub base_rate_per_period: U256,
    /// Slope up to the kink
    pub multiplier_per_period: U256,
    /// Slope above the kink
    pub jump_multiplier_per_period: U256,
    /// Utilization where the jump slope takes over
    pub kink: U256,
    pub periods_per_year: u64,
}

impl JumpRateModel {
    /// Creates a model from per-period parameters.
    pub fn new(
        base_rate_per_period: U256,
        multiplier_per_period: U256,
        jump_multiplier_per_period: U256,
        kink: U256,
        periods_per_year: u64,
    ) -> Self {
        Self {
            base_rate_per_period,
            multiplier_per_period,
            jump_multiplier_per_period,
            kink,
            periods_per_year,
        }
    }

    /// Creates a model from annual parameters, each divided by `periods_per_year`.
    pub fn from_annual(
        base_rate_per_year: U256,
        multiplier_per_year: U256,
        jump_multiplier_per_year: U256,
        kink: U256,
        periods_per_year: u64,
    ) -> Result<Self, MathError> {
        Ok(Self {
            base_rate_per_period: per_period(base_rate_per_year, periods_per_year)?,
            multiplier_per_period: per_period(multiplier_per_year, periods_per_year)?,
            jump_multiplier_per_period: per_period(jump_multiplier_per_year, periods_per_year)?,
            kink,
            periods_per_year,
        })
    }

    /// Below-kink branch: `base + multiplier * utilization / WAD`
    pub fn normal_rate(&self, utilization: U256) -> Result<U256, MathError> {
        add(
            self.base_rate_per_period,
            w_mul_down(self.multiplier_per_period, utilization)?,
        )
    }

    /// Above-kink branch: the rate at the kink plus the jump slope over the excess
    pub fn jump_rate(&self, utilization: U256) -> Result<U256, MathError> {
        let excess = sub(utilization, self.kink)?;
        add(
            self.normal_rate(self.kink)?,
            w_mul_down(self.jump_multiplier_per_period, excess)?,
        )
    }

    /// Borrow rate at a given utilization.
    pub fn rate_at_utilization(&self, utilization: U256) -> Result<U256, MathError> {
        if utilization <= self.kink {
            self.normal_rate(utilization)
        } else {
            self.jump_rate(utilization)
        }
    }
}

impl InterestRateModel for JumpRateModel {
    fn name(&self) -> &'static str {
        "jump"
    }

    fn periods_per_year(&self) -> u64 {
        self.periods_per_year
    }

    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<U256, MathError> {
        self.rate_at_utilization(utilization(cash, borrows, reserves)?)
    }
}

/// Straight-line model: `base + multiplier * utilization`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearRateModel {
    pub base_rate_per_period: U256,
    pub multiplier_per_period: U256,
    pub periods_per_year: u64,
}

impl LinearRateModel {
    pub fn from_annual(
        base_rate_per_year: U256,
        multiplier_per_year: U256,
        periods_per_year: u64,
    ) -> Result<Self, MathError> {
        Ok(Self {
            base_rate_per_period: per_period(base_rate_per_year, periods_per_year)?,
            multiplier_per_period: per_period(multiplier_per_year, periods_per_year)?,
            periods_per_year,
        })
    }
}

impl InterestRateModel for LinearRateModel {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn periods_per_year(&self) -> u64 {
        self.periods_per_year
    }

    fn borrow_rate(&self, cash: U256, borrows: U256, reserves: U256) -> Result<U256, MathError> {
        let utilization = utilization(cash, borrows, reserves)?;
        add(
            self.base_rate_per_period,
            w_mul_down(self.multiplier_per_period, utilization)?,
        )
    }
}
