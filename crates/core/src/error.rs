//! Error types for the lending ledger.

use alloy_primitives::{Address, FixedBytes, U256};
use thiserror::Error;

use crate::math::MathError;
use crate::risk::{Action, Rejection};

/// Type alias for a 32-byte market ID
pub type MarketId = FixedBytes<32>;

/// Errors that can abort a ledger operation.
///
/// An operation that returns any of these has left no trace in pool or
/// account state, except for an accrual that committed before the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarketError {
    /// Checked fixed-point arithmetic failed
    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] MathError),

    /// Accrual was requested for a period before the last accrual
    #[error("Invalid accrual period: {now} is before last accrual {last}")]
    InvalidPeriod { now: u64, last: u64 },

    /// The rate model produced a rate above the configured ceiling
    #[error("Borrow rate {rate} exceeds ceiling {max}")]
    RateTooHigh { rate: U256, max: U256 },

    /// The asset signaled failure when pulling funds into the market
    #[error("Transfer in of {amount} from {from} failed")]
    TransferInFailed { from: Address, amount: U256 },

    /// The asset signaled failure when sending funds out of the market
    #[error("Transfer out of {amount} to {to} failed")]
    TransferOutFailed { to: Address, amount: U256 },

    /// The asset returned transfer data that is neither empty nor a bool word
    #[error("Incompatible asset: {len} bytes of transfer return data")]
    IncompatibleAsset { len: usize },

    /// The risk engine rejected the operation
    #[error("{action} rejected by risk engine: {rejection}")]
    PermissionDenied { action: Action, rejection: Rejection },

    /// A repayment larger than the outstanding debt
    #[error("Repay of {amount} exceeds debt {debt} of {borrower}")]
    RepayExceedsDebt {
        borrower: Address,
        amount: U256,
        debt: U256,
    },

    /// Not enough share tokens
    #[error("Insufficient shares for {account}: have {have}, need {need}")]
    InsufficientShares {
        account: Address,
        have: U256,
        need: U256,
    },

    /// Not enough underlying held by the market
    #[error("Insufficient cash: have {have}, need {need}")]
    InsufficientCash { have: U256, need: U256 },

    /// A mutating call arrived while another was in flight
    #[error("Reentrant call rejected: a mutating operation is already in flight")]
    Reentrancy,

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Liquidator {account} cannot liquidate itself")]
    LiquidatorIsBorrower { account: Address },

    /// Collateral market has not accrued up to the liquidation period
    #[error("Collateral market {market} last accrued at {last}, expected {now}")]
    CollateralNotFresh { market: MarketId, last: u64, now: u64 },

    /// The borrower holds fewer collateral shares than the seize requires
    #[error("Insufficient collateral for {borrower}: have {have}, need {need}")]
    InsufficientCollateral {
        borrower: Address,
        have: U256,
        need: U256,
    },

    #[error("Reserve factor {factor} exceeds 1e18")]
    InvalidReserveFactor { factor: U256 },

    #[error("Insufficient reserves: have {have}, need {need}")]
    InsufficientReserves { have: U256, need: U256 },

    #[error("Cannot transfer shares from {account} to itself")]
    SelfTransfer { account: Address },

    #[error("Insufficient allowance from {owner} to {spender}: have {have}, need {need}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        have: U256,
        need: U256,
    },

    /// The "max" sentinel is not accepted here
    #[error("Invalid repay amount")]
    InvalidRepayAmount,

    /// A market parameter outside its valid range
    #[error("Invalid market config: {field} = {value}")]
    InvalidConfig { field: &'static str, value: U256 },

    /// An operation failed after pulling funds in, and returning them failed too
    #[error("{cause}; refund of {amount} to {to} also failed: {refund}")]
    RefundFailed {
        to: Address,
        amount: U256,
        cause: Box<MarketError>,
        refund: Box<MarketError>,
    },
}

/// High-level classification of a [`MarketError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Risk engine denial; may succeed once conditions change
    Permission,
    /// Overflow, division edge cases or a misconfigured rate model
    Arithmetic,
    /// The external asset failed or is incompatible
    Asset,
    /// The call itself was invalid for the current state
    Usage,
    /// Reentrant invocation
    Concurrency,
}

impl MarketError {
    /// Nonzero status code for this failure. Zero is reserved for success.
    pub fn status_code(&self) -> u32 {
        match self {
            Self::Arithmetic(_) => 1,
            Self::InvalidPeriod { .. } => 2,
            Self::RateTooHigh { .. } => 3,
            Self::TransferInFailed { .. } => 4,
            Self::TransferOutFailed { .. } => 5,
            Self::IncompatibleAsset { .. } => 6,
            Self::PermissionDenied { .. } => 7,
            Self::RepayExceedsDebt { .. } => 8,
            Self::InsufficientShares { .. } => 9,
            Self::InsufficientCash { .. } => 10,
            Self::Reentrancy => 11,
            Self::ZeroAmount => 12,
            Self::LiquidatorIsBorrower { .. } => 13,
            Self::CollateralNotFresh { .. } => 14,
            Self::InsufficientCollateral { .. } => 15,
            Self::InvalidReserveFactor { .. } => 16,
            Self::InsufficientReserves { .. } => 17,
            Self::SelfTransfer { .. } => 18,
            Self::InsufficientAllowance { .. } => 19,
            Self::InvalidRepayAmount => 20,
            Self::InvalidConfig { .. } => 21,
            Self::RefundFailed { .. } => 22,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::PermissionDenied { .. } => ErrorCategory::Permission,
            Self::Arithmetic(_) | Self::InvalidPeriod { .. } | Self::RateTooHigh { .. } => {
                ErrorCategory::Arithmetic
            }
            Self::TransferInFailed { .. }
            | Self::TransferOutFailed { .. }
            | Self::IncompatibleAsset { .. }
            | Self::RefundFailed { .. } => ErrorCategory::Asset,
            Self::Reentrancy => ErrorCategory::Concurrency,
            _ => ErrorCategory::Usage,
        }
    }

    /// Only risk engine denials are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Permission
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, MarketError>;
