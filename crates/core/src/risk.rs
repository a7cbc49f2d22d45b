//! Risk engine interface and a configurable reference engine.
//!
//! Every mutating ledger operation asks the risk engine for permission before
//! touching state. A rejection is surfaced to the caller as
//! [`MarketError::PermissionDenied`](crate::error::MarketError::PermissionDenied)
//! and is the only retryable failure class.
//!
//! Collateral valuation across markets lives entirely behind [`RiskEngine`];
//! the ledger never prices anything itself.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::MarketId;
use crate::math::{mul_div_down, w_mul_down, MathError, WAD};

/// Ledger operation kinds the risk engine can gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Supply,
    Withdraw,
    Borrow,
    Repay,
    Liquidate,
    Seize,
    Transfer,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Supply => "supply",
            Self::Withdraw => "withdraw",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
            Self::Liquidate => "liquidate",
            Self::Seize => "seize",
            Self::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// Why the risk engine refused an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("market {0} is not listed")]
    MarketNotListed(MarketId),

    #[error("{0} is paused")]
    ActionPaused(Action),

    /// The account would be (or already is) undercollateralized
    #[error("insufficient liquidity for {0}")]
    InsufficientLiquidity(Address),

    #[error("{0} is not in shortfall")]
    NotInShortfall(Address),

    /// Repay amount above the close factor bound
    #[error("repay {repay} exceeds maximum {max}")]
    TooMuchRepay { repay: U256, max: U256 },

    #[error("no price for market {0}")]
    PriceUnavailable(MarketId),

    #[error("risk computation failed: {0}")]
    Math(MathError),
}

impl Rejection {
    /// Numeric reason code reported alongside a permission denial.
    pub fn code(&self) -> u32 {
        match self {
            Self::MarketNotListed(_) => 1,
            Self::ActionPaused(_) => 2,
            Self::InsufficientLiquidity(_) => 3,
            Self::NotInShortfall(_) => 4,
            Self::TooMuchRepay { .. } => 5,
            Self::PriceUnavailable(_) => 6,
            Self::Math(_) => 7,
        }
    }
}

impl From<MathError> for Rejection {
    fn from(error: MathError) -> Self {
        Self::Math(error)
    }
}

/// External collaborator that approves or denies each ledger operation.
pub trait RiskEngine {
    fn supply_allowed(&self, market: MarketId, supplier: Address, amount: U256)
        -> Result<(), Rejection>;

    /// Checked against the account's position after the withdrawal.
    fn withdraw_allowed(&self, market: MarketId, account: Address, shares: U256)
        -> Result<(), Rejection>;

    fn borrow_allowed(&self, market: MarketId, borrower: Address, amount: U256)
        -> Result<(), Rejection>;

    fn repay_allowed(
        &self,
        market: MarketId,
        payer: Address,
        borrower: Address,
        amount: U256,
    ) -> Result<(), Rejection>;

    /// Confirms the borrower is liquidatable and bounds `repay_amount`.
    fn liquidate_allowed(
        &self,
        borrowed: MarketId,
        collateral: MarketId,
        liquidator: Address,
        borrower: Address,
        repay_amount: U256,
        borrower_debt: U256,
    ) -> Result<(), Rejection>;

    /// Confirms `borrowed` is a trusted peer of `collateral`.
    fn seize_allowed(
        &self,
        collateral: MarketId,
        borrowed: MarketId,
        liquidator: Address,
        borrower: Address,
        shares: U256,
    ) -> Result<(), Rejection>;

    fn transfer_allowed(&self, market: MarketId, from: Address, to: Address, shares: U256)
        -> Result<(), Rejection>;

    /// Collateral shares to seize for `repay_amount` of borrowed underlying.
    fn liquidate_calculate_seize_shares(
        &self,
        borrowed: MarketId,
        collateral: MarketId,
        repay_amount: U256,
        collateral_exchange_rate: U256,
    ) -> Result<U256, Rejection>;
}

/// Default fraction of a debt repayable in one liquidation (50%)
pub const DEFAULT_CLOSE_FACTOR: U256 = U256::from_limbs([500_000_000_000_000_000, 0, 0, 0]);

/// Default collateral bonus granted to liquidators (8%)
pub const DEFAULT_LIQUIDATION_INCENTIVE: U256 =
    U256::from_limbs([1_080_000_000_000_000_000, 0, 0, 0]);

/// Rule-table risk engine.
///
/// Markets are listed with a price, actions can be paused per market, and
/// shortfall is an explicit per-account flag rather than a computed position.
#[derive(Debug)]
pub struct StaticRiskEngine {
    prices: RefCell<HashMap<MarketId, U256>>,
    paused: RefCell<HashSet<(MarketId, Action)>>,
    shortfall: RefCell<HashSet<Address>>,
    close_factor: U256,
    liquidation_incentive: U256,
}

impl Default for StaticRiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticRiskEngine {
    pub fn new() -> Self {
        Self {
            prices: RefCell::default(),
            paused: RefCell::default(),
            shortfall: RefCell::default(),
            close_factor: DEFAULT_CLOSE_FACTOR,
            liquidation_incentive: DEFAULT_LIQUIDATION_INCENTIVE,
        }
    }

    pub fn with_close_factor(mut self, close_factor: U256) -> Self {
        self.close_factor = close_factor;
        self
    }

    pub fn with_liquidation_incentive(mut self, incentive: U256) -> Self {
        self.liquidation_incentive = incentive;
        self
    }

    pub fn close_factor(&self) -> U256 {
        self.close_factor
    }

    pub fn liquidation_incentive(&self) -> U256 {
        self.liquidation_incentive
    }

    /// Lists `market` with a WAD-scaled price for its underlying.
    pub fn list_market(&self, market: MarketId, price: U256) {
        self.prices.borrow_mut().insert(market, price);
    }

    pub fn is_listed(&self, market: MarketId) -> bool {
        self.prices.borrow().contains_key(&market)
    }

    pub fn pause(&self, market: MarketId, action: Action) {
        self.paused.borrow_mut().insert((market, action));
    }

    pub fn unpause(&self, market: MarketId, action: Action) {
        self.paused.borrow_mut().remove(&(market, action));
    }

    pub fn set_shortfall(&self, account: Address, in_shortfall: bool) {
        let mut shortfall = self.shortfall.borrow_mut();
        if in_shortfall {
            shortfall.insert(account);
        } else {
            shortfall.remove(&account);
        }
    }

    pub fn in_shortfall(&self, account: Address) -> bool {
        self.shortfall.borrow().contains(&account)
    }

    fn check_open(&self, market: MarketId, action: Action) -> Result<(), Rejection> {
        if !self.is_listed(market) {
            return Err(Rejection::MarketNotListed(market));
        }
        if self.paused.borrow().contains(&(market, action)) {
            return Err(Rejection::ActionPaused(action));
        }
        Ok(())
    }

    fn check_solvent(&self, account: Address) -> Result<(), Rejection> {
        if self.in_shortfall(account) {
            return Err(Rejection::InsufficientLiquidity(account));
        }
        Ok(())
    }

    fn price(&self, market: MarketId) -> Result<U256, Rejection> {
        match self.prices.borrow().get(&market) {
            Some(price) if !price.is_zero() => Ok(*price),
            _ => Err(Rejection::PriceUnavailable(market)),
        }
    }
}

impl RiskEngine for StaticRiskEngine {
    fn supply_allowed(&self, market: MarketId, _: Address, _: U256) -> Result<(), Rejection> {
        self.check_open(market, Action::Supply)
    }

    fn withdraw_allowed(&self, market: MarketId, account: Address, _: U256) -> Result<(), Rejection> {
        self.check_open(market, Action::Withdraw)?;
        self.check_solvent(account)
    }

    fn borrow_allowed(&self, market: MarketId, borrower: Address, _: U256) -> Result<(), Rejection> {
        self.check_open(market, Action::Borrow)?;
        self.check_solvent(borrower)
    }

    fn repay_allowed(&self, market: MarketId, _: Address, _: Address, _: U256) -> Result<(), Rejection> {
        self.check_open(market, Action::Repay)
    }

    fn liquidate_allowed(
        &self,
        borrowed: MarketId,
        collateral: MarketId,
        _liquidator: Address,
        borrower: Address,
        repay_amount: U256,
        borrower_debt: U256,
    ) -> Result<(), Rejection> {
        self.check_open(borrowed, Action::Liquidate)?;
        if !self.is_listed(collateral) {
            return Err(Rejection::MarketNotListed(collateral));
        }
        if !self.in_shortfall(borrower) {
            return Err(Rejection::NotInShortfall(borrower));
        }
        let max = w_mul_down(self.close_factor, borrower_debt)?;
        if repay_amount > max {
            return Err(Rejection::TooMuchRepay {
                repay: repay_amount,
                max,
            });
        }
        Ok(())
    }

    fn seize_allowed(
        &self,
        collateral: MarketId,
        borrowed: MarketId,
        _: Address,
        _: Address,
        _: U256,
    ) -> Result<(), Rejection> {
        self.check_open(collateral, Action::Seize)?;
        if !self.is_listed(borrowed) {
            return Err(Rejection::MarketNotListed(borrowed));
        }
        Ok(())
    }

    fn transfer_allowed(&self, market: MarketId, from: Address, _: Address, _: U256) -> Result<(), Rejection> {
        self.check_open(market, Action::Transfer)?;
        self.check_solvent(from)
    }

    fn liquidate_calculate_seize_shares(
        &self,
        borrowed: MarketId,
        collateral: MarketId,
        repay_amount: U256,
        collateral_exchange_rate: U256,
    ) -> Result<U256, Rejection> {
        let price_borrowed = self.price(borrowed)?;
        let price_collateral = self.price(collateral)?;

        let numerator = w_mul_down(self.liquidation_incentive, price_borrowed)?;
        let denominator = w_mul_down(price_collateral, collateral_exchange_rate)?;
        let ratio = mul_div_down(numerator, WAD, denominator)?;
        Ok(w_mul_down(ratio, repay_amount)?)
    }
}
