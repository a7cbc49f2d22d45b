//! Pooled Lending Market Ledger
//!
//! This crate implements the accounting core of a single-asset lending market:
//! suppliers deposit an underlying asset and receive interest-bearing share
//! tokens, borrowers draw against the pool and owe interest that compounds
//! through a global borrow index.
//!
//! # Overview
//!
//! - [`rate_model`] maps utilization to per-period borrow and supply rates
//! - [`accrual`] advances pool totals and the borrow index between periods
//! - [`exchange_rate`] converts between shares and underlying
//! - [`transfer`] moves the underlying asset and tolerates non-standard tokens
//! - [`market`] ties these together into atomic ledger operations
//!
//! The risk engine ([`RiskEngine`]) and the underlying asset ([`AssetToken`])
//! are external collaborators. [`StaticRiskEngine`] and [`SimulatedToken`] are
//! in-memory implementations for tests and offline simulation.
//!
//! All amounts are `U256`; rates, indices and fractions are WAD-scaled (1e18).
//!
//! # Example
//!
//! ```rust
//! use lendpool_rs_core::{InterestRateModel, JumpRateModel, WAD};
//! use alloy_primitives::U256;
//!
//! let model = JumpRateModel::from_annual(
//!     U256::from(20_000_000_000_000_000u64),   // 2% base
//!     U256::from(200_000_000_000_000_000u64),  // 20% slope
//!     U256::from(2) * WAD,                     // 200% jump slope
//!     U256::from(800_000_000_000_000_000u64),  // 80% kink
//!     2_102_400,
//! )
//! .unwrap();
//!
//! // 50% utilized: 500 borrowed against 500 cash
//! let rate = model
//!     .borrow_rate(U256::from(500) * WAD, U256::from(500) * WAD, U256::ZERO)
//!     .unwrap();
//! assert!(rate > model.base_rate_per_period);
//! ```

pub mod accounts;
pub mod accrual;
pub mod asset;
pub mod config;
pub mod error;
pub mod events;
pub mod exchange_rate;
pub mod guard;
pub mod market;
pub mod math;
pub mod pool;
pub mod rate_model;
pub mod risk;
pub mod transfer;

// Re-export commonly used types
pub use error::{ErrorCategory, MarketError, MarketId, Result};

// Ledger exports
pub use market::{AccountSnapshot, LiquidationOutcome, Market, RepayAmount, SeizeOutcome};
pub use pool::PoolState;
pub use accounts::BorrowSnapshot;
pub use events::MarketEvent;
pub use guard::GuardState;

// Math exports
pub use math::{MathError, RoundingDirection, DEFAULT_PERIODS_PER_YEAR, WAD};

// Rate model exports
pub use rate_model::{utilization, InterestRateModel, JumpRateModel, LinearRateModel};

// Collaborator exports
pub use asset::{AssetRevert, AssetToken, ReturnStyle, SimulatedToken};
pub use risk::{Action, Rejection, RiskEngine, StaticRiskEngine};
pub use transfer::TransferSignal;

// Config exports
pub use config::{MarketConfig, MarketParams, RateModelParams};
