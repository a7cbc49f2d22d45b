//! Safe movement of the underlying asset.
//!
//! Tokens report transfer success in one of two ways: no return data (failure
//! is a revert) or a single ABI-encoded bool. Anything else is rejected as an
//! incompatible asset instead of being guessed at.
//!
//! Incoming amounts are measured by balance difference, so a token that takes
//! a fee on transfer credits the market only with what actually arrived.

use alloy_primitives::{Address, Bytes, U256};
use tracing::debug;

use crate::asset::{AssetRevert, AssetToken};
use crate::error::{MarketError, Result};

/// Decoded success signal from a transfer's return data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSignal {
    /// Empty return data; the call not reverting means success
    NoSignal,
    /// A 32-byte word holding 0 or 1
    BooleanSignal(bool),
    /// Return data in any other shape
    Unsupported,
}

impl TransferSignal {
    pub fn decode(data: &[u8]) -> Self {
        if data.is_empty() {
            return Self::NoSignal;
        }
        if data.len() != 32 {
            return Self::Unsupported;
        }
        match U256::from_be_slice(data) {
            value if value.is_zero() => Self::BooleanSignal(false),
            value if value == U256::from(1) => Self::BooleanSignal(true),
            _ => Self::Unsupported,
        }
    }
}

/// Transfers between the market's own address and its counterparties.
pub struct SafeTransfer<'a> {
    asset: &'a dyn AssetToken,
    market: Address,
}

impl<'a> SafeTransfer<'a> {
    pub fn new(asset: &'a dyn AssetToken, market: Address) -> Self {
        Self { asset, market }
    }

    /// Pulls `amount` from `from` and returns how much the market received.
    pub fn transfer_in(&self, from: Address, amount: U256) -> Result<U256> {
        let before = self.asset.balance_of(self.market);
        let outcome = self.asset.transfer_from(from, self.market, amount);
        let failed = MarketError::TransferInFailed { from, amount };
        check_outcome(outcome, failed)?;

        let after = self.asset.balance_of(self.market);
        let received = after
            .checked_sub(before)
            .ok_or(MarketError::TransferInFailed { from, amount })?;
        if received != amount {
            debug!(%from, %amount, %received, "transfer in delivered a different amount");
        }
        Ok(received)
    }

    /// Sends exactly `amount` from the market to `to`.
    pub fn transfer_out(&self, to: Address, amount: U256) -> Result<()> {
        let outcome = self.asset.transfer(self.market, to, amount);
        check_outcome(outcome, MarketError::TransferOutFailed { to, amount })
    }
}

fn check_outcome(
    outcome: std::result::Result<Bytes, AssetRevert>,
    failed: MarketError,
) -> Result<()> {
    let data = outcome.map_err(|_| failed.clone())?;
    match TransferSignal::decode(&data) {
        TransferSignal::NoSignal | TransferSignal::BooleanSignal(true) => Ok(()),
        TransferSignal::BooleanSignal(false) => Err(failed),
        TransferSignal::Unsupported => Err(MarketError::IncompatibleAsset { len: data.len() }),
    }
}
