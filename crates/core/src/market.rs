//! The lending market ledger.
//!
//! A [`Market`] owns one pool of a single underlying asset. Suppliers receive
//! share tokens that appreciate as borrowers pay interest; borrowers carry a
//! [`BorrowSnapshot`] that grows with the market's borrow index.
//!
//! # Operation protocol
//!
//! Every mutating operation follows the same sequence:
//!
//! 1. Enter the reentrancy guard (a second mutating call while one is in
//!    flight fails with [`MarketError::Reentrancy`])
//! 2. Accrue interest up to `now`; this commits even if a later step fails
//! 3. Validate inputs and ask the [`RiskEngine`] for permission
//! 4. Move the asset and update pool and account state
//! 5. Record [`MarketEvent`]s
//!
//! Incoming transfers happen before state is written, and a failure after the
//! asset arrived refunds it. Outgoing transfers happen after state is written,
//! and a failed transfer restores the state captured just before.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use alloy_primitives::{Address, FixedBytes, U256};
//! use lendpool_rs_core::{
//!     AssetToken, JumpRateModel, Market, MarketConfig, SimulatedToken, StaticRiskEngine, WAD,
//! };
//!
//! let id = FixedBytes::repeat_byte(0x01);
//! let token = Rc::new(SimulatedToken::new());
//! let risk = Rc::new(StaticRiskEngine::new());
//! risk.list_market(id, WAD);
//!
//! let model = JumpRateModel::from_annual(
//!     U256::from(20_000_000_000_000_000u64),
//!     U256::from(200_000_000_000_000_000u64),
//!     U256::from(2) * WAD,
//!     U256::from(800_000_000_000_000_000u64),
//!     2_102_400,
//! )
//! .unwrap();
//!
//! let market = Market::new(
//!     id,
//!     Address::repeat_byte(0xCC),
//!     MarketConfig::new().with_initial_exchange_rate(WAD),
//!     Rc::new(model),
//!     risk,
//!     token.clone(),
//!     0,
//! )
//! .unwrap();
//!
//! let alice = Address::repeat_byte(0xA1);
//! token.mint(alice, U256::from(100) * WAD);
//! let shares = market.supply(1, alice, U256::from(100) * WAD).unwrap();
//! assert_eq!(shares, U256::from(100) * WAD);
//! assert_eq!(token.balance_of(alice), U256::ZERO);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::ptr;
use std::rc::Rc;

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::accounts::{AccountBook, BorrowSnapshot};
use crate::asset::AssetToken;
use crate::config::MarketConfig;
use crate::error::{MarketError, MarketId, Result};
use crate::events::MarketEvent;
use crate::exchange_rate::{shares_for_underlying, underlying_for_shares};
use crate::guard::{GuardState, ReentrancyGuard};
use crate::math::{add, rate_to_apy, sub, w_mul_down, zero_floor_sub, RoundingDirection, WAD};
use crate::pool::PoolState;
use crate::rate_model::InterestRateModel;
use crate::risk::{Action, Rejection, RiskEngine};
use crate::transfer::SafeTransfer;

/// Amount to repay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepayAmount {
    Exact(U256),
    /// The borrower's full current debt
    Max,
}

/// Stored position of one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub shares: U256,
    pub borrow_balance: U256,
    pub exchange_rate: U256,
}

/// Result of a successful liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LiquidationOutcome {
    /// Underlying the market actually received from the liquidator
    pub repay_amount: U256,
    /// Collateral shares taken from the borrower
    pub seize_shares: U256,
    /// Part of `seize_shares` credited to the liquidator
    pub liquidator_shares: U256,
    /// Part of `seize_shares` converted into collateral market reserves
    pub protocol_shares: U256,
}

/// Split of seized collateral shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeizeOutcome {
    pub liquidator_shares: U256,
    pub protocol_shares: U256,
    /// Underlying added to reserves for the protocol's shares
    pub protocol_amount: U256,
}

#[derive(Debug, Clone, Copy)]
struct RepayReceipt {
    amount: U256,
    account_borrows: U256,
    total_borrows: U256,
}

/// State captured before an outgoing transfer.
#[derive(Debug)]
struct Checkpoint {
    pool: PoolState,
    accounts: Vec<(Address, U256, BorrowSnapshot)>,
}

/// A single-asset lending market.
pub struct Market {
    id: MarketId,
    address: Address,
    config: MarketConfig,
    pool: RefCell<PoolState>,
    accounts: RefCell<AccountBook>,
    rate_model: RefCell<Rc<dyn InterestRateModel>>,
    risk: Rc<dyn RiskEngine>,
    asset: Rc<dyn AssetToken>,
    guard: ReentrancyGuard,
    events: RefCell<Vec<MarketEvent>>,
}

impl fmt::Debug for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Market")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("rate_model", &self.rate_model)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl Market {
    /// Creates a market whose pool starts accruing at period `now`.
    ///
    /// `address` is the account that holds the market's cash in `asset`.
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidReserveFactor`] if the configured reserve factor exceeds WAD,
    /// [`MarketError::InvalidConfig`] for a zero initial exchange rate or a protocol
    /// seize share above WAD.
    pub fn new(
        id: MarketId,
        address: Address,
        config: MarketConfig,
        rate_model: Rc<dyn InterestRateModel>,
        risk: Rc<dyn RiskEngine>,
        asset: Rc<dyn AssetToken>,
        now: u64,
    ) -> Result<Self> {
        if config.reserve_factor > WAD {
            return Err(MarketError::InvalidReserveFactor {
                factor: config.reserve_factor,
            });
        }
        if config.initial_exchange_rate.is_zero() {
            return Err(MarketError::InvalidConfig {
                field: "initial_exchange_rate",
                value: config.initial_exchange_rate,
            });
        }
        if config.protocol_seize_share > WAD {
            return Err(MarketError::InvalidConfig {
                field: "protocol_seize_share",
                value: config.protocol_seize_share,
            });
        }
        let pool = PoolState::new(config.initial_exchange_rate, config.reserve_factor, now);
        Ok(Self {
            id,
            address,
            config,
            pool: RefCell::new(pool),
            accounts: RefCell::default(),
            rate_model: RefCell::new(rate_model),
            risk,
            asset,
            guard: ReentrancyGuard::new(),
            events: RefCell::default(),
        })
    }

    // ==================== Accrual ====================

    /// Accrues interest up to `now`. A no-op within the same period.
    pub fn accrue_interest(&self, now: u64) -> Result<()> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)
    }

    fn accrue_fresh(&self, now: u64) -> Result<()> {
        let cash = self.cash();
        let model = self.rate_model();
        let pool = *self.pool.borrow();
        let Some(accrual) = pool.accrue(now, cash, model.as_ref(), self.config.max_borrow_rate)?
        else {
            return Ok(());
        };

        *self.pool.borrow_mut() = accrual.pool;
        debug!(
            market = %self.id,
            now,
            borrow_rate = %accrual.borrow_rate,
            interest = %accrual.interest_accumulated,
            borrow_index = %accrual.pool.borrow_index,
            "accrued interest"
        );
        self.emit(MarketEvent::AccrueInterest {
            cash_prior: accrual.cash_prior,
            interest_accumulated: accrual.interest_accumulated,
            borrow_index: accrual.pool.borrow_index,
            total_borrows: accrual.pool.total_borrows,
        });
        Ok(())
    }

    // ==================== Supply / Withdraw ====================

    /// Supplies `amount` of underlying from `supplier` and returns the shares minted.
    ///
    /// Shares are computed from the amount that actually arrived, at the
    /// exchange rate before the transfer, rounded down.
    pub fn supply(&self, now: u64, supplier: Address, amount: U256) -> Result<U256> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        self.permit(
            Action::Supply,
            self.risk.supply_allowed(self.id, supplier, amount),
        )?;

        let exchange_rate = self.exchange_rate_stored()?;
        let received = self.safe_transfer().transfer_in(supplier, amount)?;
        let shares = match self.credit_supply(supplier, received, exchange_rate) {
            Ok(shares) => shares,
            Err(err) => {
                return Err(self.refund(supplier, received, err));
            }
        };

        self.emit(MarketEvent::Supply {
            supplier,
            amount: received,
            shares,
        });
        self.emit(MarketEvent::Transfer {
            from: Address::ZERO,
            to: supplier,
            shares,
        });
        info!(market = %self.id, %supplier, amount = %received, %shares, "supply");
        Ok(shares)
    }

    fn credit_supply(&self, supplier: Address, received: U256, exchange_rate: U256) -> Result<U256> {
        let shares = shares_for_underlying(received, exchange_rate, RoundingDirection::Down)?;
        if shares.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let total_supply = add(self.pool.borrow().total_supply, shares)?;
        let balance = add(self.share_balance(supplier), shares)?;

        self.pool.borrow_mut().total_supply = total_supply;
        self.accounts.borrow_mut().set_shares(supplier, balance);
        Ok(shares)
    }

    /// Burns `shares` of `account` and pays out their underlying value, rounded down.
    pub fn withdraw(&self, now: u64, account: Address, shares: U256) -> Result<U256> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        if shares.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let amount = underlying_for_shares(shares, self.exchange_rate_stored()?)?;
        self.redeem_fresh(account, shares, amount)?;
        Ok(amount)
    }

    /// Pays out exactly `amount` of underlying, burning the shares needed rounded up.
    pub fn withdraw_underlying(&self, now: u64, account: Address, amount: U256) -> Result<U256> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let exchange_rate = self.exchange_rate_stored()?;
        let shares = shares_for_underlying(amount, exchange_rate, RoundingDirection::Up)?;
        self.redeem_fresh(account, shares, amount)?;
        Ok(shares)
    }

    fn redeem_fresh(&self, account: Address, shares: U256, amount: U256) -> Result<()> {
        self.permit(
            Action::Withdraw,
            self.risk.withdraw_allowed(self.id, account, shares),
        )?;

        let have = self.share_balance(account);
        if have < shares {
            return Err(MarketError::InsufficientShares {
                account,
                have,
                need: shares,
            });
        }
        let cash = self.cash();
        if cash < amount {
            return Err(MarketError::InsufficientCash { have: cash, need: amount });
        }
        let total_supply = sub(self.pool.borrow().total_supply, shares)?;

        let checkpoint = self.checkpoint(&[account]);
        self.pool.borrow_mut().total_supply = total_supply;
        self.accounts.borrow_mut().set_shares(account, have - shares);
        self.transfer_out_or_restore(account, amount, checkpoint)?;

        self.emit(MarketEvent::Withdraw {
            withdrawer: account,
            amount,
            shares,
        });
        self.emit(MarketEvent::Transfer {
            from: account,
            to: Address::ZERO,
            shares,
        });
        info!(market = %self.id, %account, %amount, %shares, "withdraw");
        Ok(())
    }

    // ==================== Borrow / Repay ====================

    /// Lends `amount` of underlying to `borrower`.
    pub fn borrow(&self, now: u64, borrower: Address, amount: U256) -> Result<()> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        self.permit(
            Action::Borrow,
            self.risk.borrow_allowed(self.id, borrower, amount),
        )?;

        let cash = self.cash();
        if cash < amount {
            return Err(MarketError::InsufficientCash { have: cash, need: amount });
        }
        let pool = *self.pool.borrow();
        let account_borrows = add(self.borrow_balance_at(borrower, pool.borrow_index)?, amount)?;
        let total_borrows = add(pool.total_borrows, amount)?;

        let checkpoint = self.checkpoint(&[borrower]);
        self.pool.borrow_mut().total_borrows = total_borrows;
        self.accounts.borrow_mut().set_borrow_snapshot(
            borrower,
            BorrowSnapshot {
                principal: account_borrows,
                interest_index: pool.borrow_index,
            },
        );
        self.transfer_out_or_restore(borrower, amount, checkpoint)?;

        self.emit(MarketEvent::Borrow {
            borrower,
            amount,
            account_borrows,
            total_borrows,
        });
        info!(market = %self.id, %borrower, %amount, %account_borrows, "borrow");
        Ok(())
    }

    /// Repays the caller's own debt. Returns the amount actually repaid.
    pub fn repay(&self, now: u64, borrower: Address, amount: RepayAmount) -> Result<U256> {
        self.repay_on_behalf(now, borrower, borrower, amount)
    }

    /// Repays `borrower`'s debt with funds from `payer`.
    pub fn repay_on_behalf(
        &self,
        now: u64,
        payer: Address,
        borrower: Address,
        amount: RepayAmount,
    ) -> Result<U256> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        let receipt = self.repay_fresh(payer, borrower, amount)?;

        self.emit(MarketEvent::RepayBorrow {
            payer,
            borrower,
            amount: receipt.amount,
            account_borrows: receipt.account_borrows,
            total_borrows: receipt.total_borrows,
        });
        info!(market = %self.id, %payer, %borrower, amount = %receipt.amount, "repay");
        Ok(receipt.amount)
    }

    fn repay_fresh(
        &self,
        payer: Address,
        borrower: Address,
        amount: RepayAmount,
    ) -> Result<RepayReceipt> {
        let borrow_index = self.pool.borrow().borrow_index;
        let debt = self.borrow_balance_at(borrower, borrow_index)?;
        let requested = match amount {
            RepayAmount::Max => debt,
            RepayAmount::Exact(requested) if requested > debt => {
                return Err(MarketError::RepayExceedsDebt {
                    borrower,
                    amount: requested,
                    debt,
                });
            }
            RepayAmount::Exact(requested) => requested,
        };
        if requested.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        self.permit(
            Action::Repay,
            self.risk.repay_allowed(self.id, payer, borrower, requested),
        )?;

        let received = self.safe_transfer().transfer_in(payer, requested)?;
        match self.apply_repay(borrower, received, debt) {
            Ok(receipt) => Ok(receipt),
            Err(err) => {
                Err(self.refund(payer, received, err))
            }
        }
    }

    fn apply_repay(&self, borrower: Address, received: U256, debt: U256) -> Result<RepayReceipt> {
        let pool = *self.pool.borrow();
        let account_borrows = sub(debt, received)?;
        // Per-account balances round independently of the aggregate
        let total_borrows = zero_floor_sub(pool.total_borrows, received);

        self.pool.borrow_mut().total_borrows = total_borrows;
        self.accounts.borrow_mut().set_borrow_snapshot(
            borrower,
            BorrowSnapshot {
                principal: account_borrows,
                interest_index: pool.borrow_index,
            },
        );
        Ok(RepayReceipt {
            amount: received,
            account_borrows,
            total_borrows,
        })
    }

    // ==================== Liquidation ====================

    /// Repays part of `borrower`'s debt on their behalf and seizes collateral
    /// shares from `collateral` (which may be this same market).
    pub fn liquidate(
        &self,
        now: u64,
        liquidator: Address,
        borrower: Address,
        repay_amount: U256,
        collateral: &Market,
    ) -> Result<LiquidationOutcome> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        let same_market = ptr::eq(self, collateral);
        if !same_market {
            collateral.accrue_interest(now)?;
        }
        let collateral_period = collateral.pool.borrow().accrual_period;
        if collateral_period != now {
            return Err(MarketError::CollateralNotFresh {
                market: collateral.id,
                last: collateral_period,
                now,
            });
        }

        if liquidator == borrower {
            return Err(MarketError::LiquidatorIsBorrower {
                account: liquidator,
            });
        }
        if repay_amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        if repay_amount == U256::MAX {
            return Err(MarketError::InvalidRepayAmount);
        }

        let borrow_index = self.pool.borrow().borrow_index;
        let debt = self.borrow_balance_at(borrower, borrow_index)?;
        self.permit(
            Action::Liquidate,
            self.risk.liquidate_allowed(
                self.id,
                collateral.id,
                liquidator,
                borrower,
                repay_amount,
                debt,
            ),
        )?;

        let collateral_rate = collateral.exchange_rate_stored()?;
        let planned = self.seize_shares_for(collateral.id, repay_amount, collateral_rate)?;
        let collateral_shares = collateral.share_balance(borrower);
        if collateral_shares < planned {
            return Err(MarketError::InsufficientCollateral {
                borrower,
                have: collateral_shares,
                need: planned,
            });
        }

        let checkpoint = self.checkpoint(&[borrower]);
        let receipt = self.repay_fresh(liquidator, borrower, RepayAmount::Exact(repay_amount))?;

        let seized = self
            .seize_shares_for(collateral.id, receipt.amount, collateral_rate)
            .and_then(|seize_shares| {
                let outcome = if same_market {
                    self.seize_fresh(self.id, liquidator, borrower, seize_shares)
                } else {
                    collateral.seize(now, self.id, liquidator, borrower, seize_shares)
                }?;
                Ok((seize_shares, outcome))
            });
        let (seize_shares, outcome) = match seized {
            Ok(seized) => seized,
            Err(err) => {
                self.restore(checkpoint);
                return Err(self.refund(liquidator, receipt.amount, err));
            }
        };

        self.emit(MarketEvent::RepayBorrow {
            payer: liquidator,
            borrower,
            amount: receipt.amount,
            account_borrows: receipt.account_borrows,
            total_borrows: receipt.total_borrows,
        });
        self.emit(MarketEvent::LiquidateBorrow {
            liquidator,
            borrower,
            repay_amount: receipt.amount,
            collateral_market: collateral.id,
            seize_shares,
        });
        info!(
            market = %self.id,
            collateral = %collateral.id,
            %liquidator,
            %borrower,
            repay_amount = %receipt.amount,
            %seize_shares,
            "liquidate"
        );
        Ok(LiquidationOutcome {
            repay_amount: receipt.amount,
            seize_shares,
            liquidator_shares: outcome.liquidator_shares,
            protocol_shares: outcome.protocol_shares,
        })
    }

    fn seize_shares_for(
        &self,
        collateral: MarketId,
        repay_amount: U256,
        collateral_rate: U256,
    ) -> Result<U256> {
        let seize = self.risk.liquidate_calculate_seize_shares(
            self.id,
            collateral,
            repay_amount,
            collateral_rate,
        );
        self.permit(Action::Liquidate, seize)
    }

    /// Moves `shares` of collateral from `borrower` to `liquidator`, diverting
    /// the protocol seize share into reserves.
    ///
    /// Called by the market identified by `seizer`, which the risk engine must trust.
    pub fn seize(
        &self,
        now: u64,
        seizer: MarketId,
        liquidator: Address,
        borrower: Address,
        shares: U256,
    ) -> Result<SeizeOutcome> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        self.seize_fresh(seizer, liquidator, borrower, shares)
    }

    fn seize_fresh(
        &self,
        seizer: MarketId,
        liquidator: Address,
        borrower: Address,
        shares: U256,
    ) -> Result<SeizeOutcome> {
        self.permit(
            Action::Seize,
            self.risk
                .seize_allowed(self.id, seizer, liquidator, borrower, shares),
        )?;
        if liquidator == borrower {
            return Err(MarketError::LiquidatorIsBorrower {
                account: liquidator,
            });
        }
        let have = self.share_balance(borrower);
        if have < shares {
            return Err(MarketError::InsufficientCollateral {
                borrower,
                have,
                need: shares,
            });
        }

        let protocol_shares = w_mul_down(shares, self.config.protocol_seize_share)?;
        let liquidator_shares = sub(shares, protocol_shares)?;
        let protocol_amount = underlying_for_shares(protocol_shares, self.exchange_rate_stored()?)?;

        let pool = *self.pool.borrow();
        let total_reserves = add(pool.total_reserves, protocol_amount)?;
        let total_supply = sub(pool.total_supply, protocol_shares)?;
        let liquidator_balance = add(self.share_balance(liquidator), liquidator_shares)?;

        {
            let mut pool = self.pool.borrow_mut();
            pool.total_reserves = total_reserves;
            pool.total_supply = total_supply;
        }
        {
            let mut accounts = self.accounts.borrow_mut();
            accounts.set_shares(borrower, have - shares);
            accounts.set_shares(liquidator, liquidator_balance);
        }

        self.emit(MarketEvent::Transfer {
            from: borrower,
            to: liquidator,
            shares: liquidator_shares,
        });
        self.emit(MarketEvent::Transfer {
            from: borrower,
            to: self.address,
            shares: protocol_shares,
        });
        self.emit(MarketEvent::ReservesAdded {
            benefactor: self.address,
            amount: protocol_amount,
            total_reserves,
        });
        info!(
            market = %self.id,
            %borrower,
            %liquidator,
            %liquidator_shares,
            %protocol_shares,
            "seize"
        );
        Ok(SeizeOutcome {
            liquidator_shares,
            protocol_shares,
            protocol_amount,
        })
    }

    // ==================== Share Transfers ====================

    /// Moves `shares` from the caller to `dst`.
    pub fn transfer(&self, src: Address, dst: Address, shares: U256) -> Result<()> {
        self.transfer_tokens(src, src, dst, shares)
    }

    /// Moves `shares` from `src` to `dst` using `spender`'s allowance.
    pub fn transfer_from(
        &self,
        spender: Address,
        src: Address,
        dst: Address,
        shares: U256,
    ) -> Result<()> {
        self.transfer_tokens(spender, src, dst, shares)
    }

    fn transfer_tokens(&self, spender: Address, src: Address, dst: Address, shares: U256) -> Result<()> {
        let _token = self.guard.enter()?;
        if src == dst {
            return Err(MarketError::SelfTransfer { account: src });
        }
        self.permit(
            Action::Transfer,
            self.risk.transfer_allowed(self.id, src, dst, shares),
        )?;

        let allowance = if spender == src {
            U256::MAX
        } else {
            self.allowance(src, spender)
        };
        if allowance < shares {
            return Err(MarketError::InsufficientAllowance {
                owner: src,
                spender,
                have: allowance,
                need: shares,
            });
        }
        let src_balance = self.share_balance(src);
        if src_balance < shares {
            return Err(MarketError::InsufficientShares {
                account: src,
                have: src_balance,
                need: shares,
            });
        }
        let dst_balance = add(self.share_balance(dst), shares)?;

        {
            let mut accounts = self.accounts.borrow_mut();
            accounts.set_shares(src, src_balance - shares);
            accounts.set_shares(dst, dst_balance);
            if allowance != U256::MAX {
                accounts.set_allowance(src, spender, allowance - shares);
            }
        }

        self.emit(MarketEvent::Transfer {
            from: src,
            to: dst,
            shares,
        });
        debug!(market = %self.id, %src, %dst, %shares, "transfer");
        Ok(())
    }

    /// Sets `spender`'s allowance over `owner`'s shares.
    pub fn approve(&self, owner: Address, spender: Address, amount: U256) -> Result<()> {
        let _token = self.guard.enter()?;
        self.accounts
            .borrow_mut()
            .set_allowance(owner, spender, amount);
        self.emit(MarketEvent::Approval {
            owner,
            spender,
            amount,
        });
        Ok(())
    }

    // ==================== Reserves and Parameters ====================

    /// Adds underlying from `from` to reserves. Returns the amount received.
    pub fn add_reserves(&self, now: u64, from: Address, amount: U256) -> Result<U256> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }

        let reserves = self.pool.borrow().total_reserves;
        let received = self.safe_transfer().transfer_in(from, amount)?;
        let total_reserves = match add(reserves, received) {
            Ok(total) => total,
            Err(err) => {
                return Err(self.refund(from, received, MarketError::from(err)));
            }
        };
        self.pool.borrow_mut().total_reserves = total_reserves;

        self.emit(MarketEvent::ReservesAdded {
            benefactor: from,
            amount: received,
            total_reserves,
        });
        info!(market = %self.id, %from, amount = %received, %total_reserves, "reserves added");
        Ok(received)
    }

    /// Pays `amount` of reserves out to `to`.
    pub fn reduce_reserves(&self, now: u64, to: Address, amount: U256) -> Result<()> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        if amount.is_zero() {
            return Err(MarketError::ZeroAmount);
        }
        let cash = self.cash();
        if cash < amount {
            return Err(MarketError::InsufficientCash { have: cash, need: amount });
        }
        let reserves = self.pool.borrow().total_reserves;
        if reserves < amount {
            return Err(MarketError::InsufficientReserves {
                have: reserves,
                need: amount,
            });
        }

        let total_reserves = reserves - amount;
        let checkpoint = self.checkpoint(&[]);
        self.pool.borrow_mut().total_reserves = total_reserves;
        self.transfer_out_or_restore(to, amount, checkpoint)?;

        self.emit(MarketEvent::ReservesReduced {
            to,
            amount,
            total_reserves,
        });
        info!(market = %self.id, %to, %amount, %total_reserves, "reserves reduced");
        Ok(())
    }

    /// Changes the share of interest routed to reserves, after accruing at the old one.
    pub fn set_reserve_factor(&self, now: u64, factor: U256) -> Result<()> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;
        if factor > WAD {
            return Err(MarketError::InvalidReserveFactor { factor });
        }

        let old = std::mem::replace(&mut self.pool.borrow_mut().reserve_factor, factor);
        self.emit(MarketEvent::NewReserveFactor { old, new: factor });
        info!(market = %self.id, %old, new = %factor, "reserve factor changed");
        Ok(())
    }

    /// Swaps the rate model, after accruing under the old one.
    pub fn set_interest_rate_model(&self, now: u64, model: Rc<dyn InterestRateModel>) -> Result<()> {
        let _token = self.guard.enter()?;
        self.accrue_fresh(now)?;

        let new = model.name().to_string();
        let old = std::mem::replace(&mut *self.rate_model.borrow_mut(), model);
        let old = old.name().to_string();
        info!(market = %self.id, %old, %new, "interest rate model changed");
        self.emit(MarketEvent::NewInterestRateModel { old, new });
        Ok(())
    }

    // ==================== Views ====================

    pub fn id(&self) -> MarketId {
        self.id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Copy of the pool totals as of the last accrual.
    pub fn pool(&self) -> PoolState {
        *self.pool.borrow()
    }

    pub fn rate_model(&self) -> Rc<dyn InterestRateModel> {
        Rc::clone(&self.rate_model.borrow())
    }

    pub fn guard_state(&self) -> GuardState {
        self.guard.state()
    }

    /// Underlying held by the market.
    pub fn cash(&self) -> U256 {
        self.asset.balance_of(self.address)
    }

    pub fn share_balance(&self, account: Address) -> U256 {
        self.accounts.borrow().shares(account)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.accounts.borrow().allowance(owner, spender)
    }

    pub fn borrow_snapshot(&self, account: Address) -> BorrowSnapshot {
        self.accounts.borrow().borrow_snapshot(account)
    }

    pub fn exchange_rate_stored(&self) -> Result<U256> {
        let cash = self.cash();
        Ok(self.pool.borrow().exchange_rate_stored(cash)?)
    }

    /// Exchange rate as if accrued to `now`, without committing the accrual.
    pub fn exchange_rate_current(&self, now: u64) -> Result<U256> {
        let cash = self.cash();
        Ok(self.projected_pool(now)?.exchange_rate_stored(cash)?)
    }

    pub fn borrow_balance_stored(&self, account: Address) -> Result<U256> {
        self.borrow_balance_at(account, self.pool.borrow().borrow_index)
    }

    pub fn borrow_balance_current(&self, now: u64, account: Address) -> Result<U256> {
        self.borrow_balance_at(account, self.projected_pool(now)?.borrow_index)
    }

    pub fn total_borrows_current(&self, now: u64) -> Result<U256> {
        Ok(self.projected_pool(now)?.total_borrows)
    }

    /// Underlying value of `account`'s shares at the current exchange rate.
    pub fn balance_of_underlying(&self, now: u64, account: Address) -> Result<U256> {
        let exchange_rate = self.exchange_rate_current(now)?;
        Ok(underlying_for_shares(self.share_balance(account), exchange_rate)?)
    }

    pub fn account_snapshot(&self, account: Address) -> Result<AccountSnapshot> {
        Ok(AccountSnapshot {
            shares: self.share_balance(account),
            borrow_balance: self.borrow_balance_stored(account)?,
            exchange_rate: self.exchange_rate_stored()?,
        })
    }

    pub fn borrow_rate_per_period(&self) -> Result<U256> {
        let cash = self.cash();
        let pool = self.pool();
        Ok(self
            .rate_model()
            .borrow_rate(cash, pool.total_borrows, pool.total_reserves)?)
    }

    pub fn supply_rate_per_period(&self) -> Result<U256> {
        let cash = self.cash();
        let pool = self.pool();
        Ok(self.rate_model().supply_rate(
            cash,
            pool.total_borrows,
            pool.total_reserves,
            pool.reserve_factor,
        )?)
    }

    /// Compounded annual borrow rate.
    pub fn borrow_apy(&self) -> Result<f64> {
        let periods = self.rate_model().periods_per_year();
        Ok(rate_to_apy(self.borrow_rate_per_period()?, periods))
    }

    /// Compounded annual supply rate.
    pub fn supply_apy(&self) -> Result<f64> {
        let periods = self.rate_model().periods_per_year();
        Ok(rate_to_apy(self.supply_rate_per_period()?, periods))
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<MarketEvent> {
        self.events.borrow().clone()
    }

    /// Drains the recorded events.
    pub fn take_events(&self) -> Vec<MarketEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    // ==================== Internals ====================

    fn projected_pool(&self, now: u64) -> Result<PoolState> {
        let cash = self.cash();
        let model = self.rate_model();
        let pool = self.pool();
        let accrual = pool.accrue(now, cash, model.as_ref(), self.config.max_borrow_rate)?;
        Ok(accrual.map_or(pool, |accrual| accrual.pool))
    }

    fn borrow_balance_at(&self, account: Address, borrow_index: U256) -> Result<U256> {
        Ok(self.borrow_snapshot(account).balance(borrow_index)?)
    }

    /// Arithmetic failures inside the risk engine surface as arithmetic errors,
    /// not denials.
    fn permit<T>(&self, action: Action, check: std::result::Result<T, Rejection>) -> Result<T> {
        check.map_err(|rejection| match rejection {
            Rejection::Math(error) => {
                warn!(market = %self.id, %action, %error, "risk computation failed");
                MarketError::Arithmetic(error)
            }
            rejection => {
                warn!(market = %self.id, %action, %rejection, "risk engine rejected operation");
                MarketError::PermissionDenied { action, rejection }
            }
        })
    }

    fn safe_transfer(&self) -> SafeTransfer<'_> {
        SafeTransfer::new(self.asset.as_ref(), self.address)
    }

    fn emit(&self, event: MarketEvent) {
        self.events.borrow_mut().push(event);
    }

    fn checkpoint(&self, accounts: &[Address]) -> Checkpoint {
        let book = self.accounts.borrow();
        Checkpoint {
            pool: self.pool(),
            accounts: accounts
                .iter()
                .map(|account| (*account, book.shares(*account), book.borrow_snapshot(*account)))
                .collect(),
        }
    }

    fn restore(&self, checkpoint: Checkpoint) {
        *self.pool.borrow_mut() = checkpoint.pool;
        let mut book = self.accounts.borrow_mut();
        for (account, shares, snapshot) in checkpoint.accounts {
            book.set_shares(account, shares);
            book.set_borrow_snapshot(account, snapshot);
        }
    }

    fn transfer_out_or_restore(&self, to: Address, amount: U256, checkpoint: Checkpoint) -> Result<()> {
        if let Err(err) = self.safe_transfer().transfer_out(to, amount) {
            self.restore(checkpoint);
            warn!(market = %self.id, %to, %amount, error = %err, "transfer out failed, state restored");
            return Err(err);
        }
        Ok(())
    }

    /// Returns funds pulled in by an operation that then failed, yielding the
    /// error to report. A failed refund leaves the funds as unaccounted cash and
    /// is reported as [`MarketError::RefundFailed`].
    fn refund(&self, to: Address, amount: U256, cause: MarketError) -> MarketError {
        if amount.is_zero() {
            return cause;
        }
        match self.safe_transfer().transfer_out(to, amount) {
            Ok(()) => {
                warn!(market = %self.id, %to, %amount, error = %cause, "operation failed, refunded");
                cause
            }
            Err(refund_error) => {
                warn!(
                    market = %self.id,
                    %to,
                    %amount,
                    error = %cause,
                    %refund_error,
                    "operation failed and refund failed"
                );
                MarketError::RefundFailed {
                    to,
                    amount,
                    cause: Box::new(cause),
                    refund: Box::new(refund_error),
                }
            }
        }
    }
}
