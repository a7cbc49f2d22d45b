//! Checked fixed-point arithmetic on WAD-scaled `U256` values.
//!
//! Every mantissa in the ledger (rates, indices, exchange rates, fractions)
//! shares the scale [`WAD`] = 1e18. The helpers here never panic: overflow,
//! underflow and division by zero come back as [`MathError`].

use alloy_primitives::U256;
use thiserror::Error;

/// 1e18, the scale shared by every mantissa
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Periods per year for a 15 second block time
pub const DEFAULT_PERIODS_PER_YEAR: u64 = 2_102_400;

/// Failure of a checked fixed-point operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

/// Which way a division result is rounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundingDirection {
    Up,
    Down,
}

pub fn add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn sub(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

pub fn mul(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

pub fn div(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_div(b).ok_or(MathError::DivisionByZero)
}

/// `x * y / d`, rounded down
pub fn mul_div_down(x: U256, y: U256, d: U256) -> Result<U256, MathError> {
    div(mul(x, y)?, d)
}

/// `x * y / d`, rounded up
pub fn mul_div_up(x: U256, y: U256, d: U256) -> Result<U256, MathError> {
    if d.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = mul(x, y)?;
    let quotient = product / d;
    if (product % d).is_zero() {
        Ok(quotient)
    } else {
        add(quotient, U256::from(1))
    }
}

/// `x * y / d` in the requested direction
pub fn mul_div(
    x: U256,
    y: U256,
    d: U256,
    rounding: RoundingDirection,
) -> Result<U256, MathError> {
    match rounding {
        RoundingDirection::Down => mul_div_down(x, y, d),
        RoundingDirection::Up => mul_div_up(x, y, d),
    }
}

/// `a * b / WAD`, rounded down
pub fn w_mul_down(a: U256, b: U256) -> Result<U256, MathError> {
    mul_div_down(a, b, WAD)
}

/// `a * WAD / b`, rounded down
pub fn w_div_down(a: U256, b: U256) -> Result<U256, MathError> {
    mul_div_down(a, WAD, b)
}

/// `a * WAD / b`, rounded up
pub fn w_div_up(a: U256, b: U256) -> Result<U256, MathError> {
    mul_div_up(a, WAD, b)
}

/// `a - b`, floored at zero
pub fn zero_floor_sub(a: U256, b: U256) -> U256 {
    a.saturating_sub(b)
}

/// Converts a WAD-scaled value to `f64` for display.
pub fn wad_to_f64(value: U256) -> f64 {
    let whole: u128 = (value / WAD).saturating_to();
    let frac: u128 = (value % WAD).saturating_to();
    whole as f64 + frac as f64 / 1e18
}

/// Simple annualized rate from a per-period rate.
pub fn rate_to_apr(rate_per_period: U256, periods_per_year: u64) -> f64 {
    wad_to_f64(rate_per_period) * periods_per_year as f64
}

/// Compounded annualized rate from a per-period rate: `(1 + r)^n - 1`.
pub fn rate_to_apy(rate_per_period: U256, periods_per_year: u64) -> f64 {
    (1.0 + wad_to_f64(rate_per_period)).powf(periods_per_year as f64) - 1.0
}
