//! Market configuration.
//!
//! [`MarketConfig`] holds mantissa-level parameters the ledger consumes.
//! [`MarketParams`] and [`RateModelParams`] are the human-readable form read
//! from configuration files: decimal fractions and annual rates that convert
//! into WAD-scaled values.
//!
//! # Example
//!
//! ```json
//! {
//!   "initial_exchange_rate": "0.02",
//!   "reserve_factor": "0.1",
//!   "rate_model": {
//!     "kind": "jump",
//!     "base_rate_per_year": "0.02",
//!     "multiplier_per_year": "0.2",
//!     "jump_multiplier_per_year": "2",
//!     "kink": "0.8"
//!   }
//! }
//! ```

use std::rc::Rc;

use alloy_primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::math::{div, mul, MathError, DEFAULT_PERIODS_PER_YEAR};
use crate::rate_model::{InterestRateModel, JumpRateModel, LinearRateModel};

/// Default per-period borrow rate ceiling (0.0005% per period)
pub const DEFAULT_MAX_BORROW_RATE: U256 = U256::from_limbs([5_000_000_000_000, 0, 0, 0]);

/// Default share of seized collateral kept by the protocol (2.8%)
pub const DEFAULT_PROTOCOL_SEIZE_SHARE: U256 = U256::from_limbs([28_000_000_000_000_000, 0, 0, 0]);

/// Default exchange rate before any shares exist (0.02 underlying per share)
pub const DEFAULT_INITIAL_EXCHANGE_RATE: U256 = U256::from_limbs([20_000_000_000_000_000, 0, 0, 0]);

/// Decimal places in a WAD mantissa
const WAD_DECIMALS: u32 = 18;

/// Mantissa-level market parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Exchange rate used while no shares exist
    pub initial_exchange_rate: U256,
    /// Fraction of interest routed to reserves
    pub reserve_factor: U256,
    /// Fraction of seized collateral diverted to reserves
    pub protocol_seize_share: U256,
    /// Per-period borrow rate above which accrual fails
    pub max_borrow_rate: U256,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            initial_exchange_rate: DEFAULT_INITIAL_EXCHANGE_RATE,
            reserve_factor: U256::ZERO,
            protocol_seize_share: DEFAULT_PROTOCOL_SEIZE_SHARE,
            max_borrow_rate: DEFAULT_MAX_BORROW_RATE,
        }
    }
}

impl MarketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_exchange_rate(mut self, rate: U256) -> Self {
        self.initial_exchange_rate = rate;
        self
    }

    pub fn with_reserve_factor(mut self, factor: U256) -> Self {
        self.reserve_factor = factor;
        self
    }

    pub fn with_protocol_seize_share(mut self, share: U256) -> Self {
        self.protocol_seize_share = share;
        self
    }

    pub fn with_max_borrow_rate(mut self, rate: U256) -> Self {
        self.max_borrow_rate = rate;
        self
    }
}

fn default_periods_per_year() -> u64 {
    DEFAULT_PERIODS_PER_YEAR
}

fn default_initial_exchange_rate() -> Decimal {
    Decimal::new(2, 2)
}

fn default_protocol_seize_share() -> Decimal {
    Decimal::new(28, 3)
}

/// Human-readable rate model parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModelParams {
    Jump {
        base_rate_per_year: Decimal,
        multiplier_per_year: Decimal,
        jump_multiplier_per_year: Decimal,
        kink: Decimal,
        #[serde(default = "default_periods_per_year")]
        periods_per_year: u64,
    },
    Linear {
        base_rate_per_year: Decimal,
        multiplier_per_year: Decimal,
        #[serde(default = "default_periods_per_year")]
        periods_per_year: u64,
    },
}

impl RateModelParams {
    pub fn periods_per_year(&self) -> u64 {
        match self {
            Self::Jump {
                periods_per_year, ..
            }
            | Self::Linear {
                periods_per_year, ..
            } => *periods_per_year,
        }
    }

    /// Builds the per-period model.
    pub fn build(&self) -> Result<Rc<dyn InterestRateModel>, MathError> {
        match self {
            Self::Jump {
                base_rate_per_year,
                multiplier_per_year,
                jump_multiplier_per_year,
                kink,
                periods_per_year,
            } => {
                let model = JumpRateModel::from_annual(
                    decimal_to_wad(*base_rate_per_year)?,
                    decimal_to_wad(*multiplier_per_year)?,
                    decimal_to_wad(*jump_multiplier_per_year)?,
                    decimal_to_wad(*kink)?,
                    *periods_per_year,
                )?;
                Ok(Rc::new(model))
            }
            Self::Linear {
                base_rate_per_year,
                multiplier_per_year,
                periods_per_year,
            } => {
                let model = LinearRateModel::from_annual(
                    decimal_to_wad(*base_rate_per_year)?,
                    decimal_to_wad(*multiplier_per_year)?,
                    *periods_per_year,
                )?;
                Ok(Rc::new(model))
            }
        }
    }
}

/// Human-readable market parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    #[serde(default = "default_initial_exchange_rate")]
    pub initial_exchange_rate: Decimal,
    #[serde(default)]
    pub reserve_factor: Decimal,
    #[serde(default = "default_protocol_seize_share")]
    pub protocol_seize_share: Decimal,
    pub rate_model: RateModelParams,
}

impl MarketParams {
    /// Converts into mantissa form, keeping the default borrow rate ceiling.
    pub fn market_config(&self) -> Result<MarketConfig, MathError> {
        Ok(MarketConfig::new()
            .with_initial_exchange_rate(decimal_to_wad(self.initial_exchange_rate)?)
            .with_reserve_factor(decimal_to_wad(self.reserve_factor)?)
            .with_protocol_seize_share(decimal_to_wad(self.protocol_seize_share)?))
    }
}

/// Converts a decimal to a WAD mantissa, truncating digits past the 18th.
///
/// # Errors
///
/// [`MathError::Underflow`] for negative values.
pub fn decimal_to_wad(value: Decimal) -> Result<U256, MathError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(MathError::Underflow);
    }
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();
    if scale <= WAD_DECIMALS {
        mul(mantissa, pow10(WAD_DECIMALS - scale))
    } else {
        div(mantissa, pow10(scale - WAD_DECIMALS))
    }
}

/// Converts a WAD mantissa to a decimal, or `None` if it does not fit.
pub fn wad_to_decimal(value: U256) -> Option<Decimal> {
    let mantissa = i128::try_from(value).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, WAD_DECIMALS)
        .ok()
        .map(|decimal| decimal.normalize())
}

fn pow10(exponent: u32) -> U256 {
    U256::from(10).pow(U256::from(exponent))
}
