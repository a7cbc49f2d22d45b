//! The underlying asset as seen by the market.
//!
//! [`AssetToken`] is the external collaborator that actually holds balances.
//! Transfers hand back raw return data rather than a decoded result, since
//! tokens disagree on what (if anything) a transfer returns; decoding happens
//! in [`crate::transfer`].
//!
//! [`SimulatedToken`] is an in-memory implementation used by tests and the CLI.
//! It can charge a fee on transfer, use any of the return conventions seen in
//! the wild, and run a hook in the middle of a transfer.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

use alloy_primitives::{Address, Bytes, U256};
use thiserror::Error;

/// A transfer that aborted instead of returning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("asset reverted: {reason}")]
pub struct AssetRevert {
    pub reason: String,
}

impl AssetRevert {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An external fungible asset.
pub trait AssetToken {
    fn balance_of(&self, account: Address) -> U256;

    /// Pulls `amount` from `from` into `to` (the market pulling a payment in).
    fn transfer_from(&self, from: Address, to: Address, amount: U256) -> Result<Bytes, AssetRevert>;

    /// Sends `amount` held by `sender` to `to` (the market paying out).
    fn transfer(&self, sender: Address, to: Address, amount: U256) -> Result<Bytes, AssetRevert>;
}

/// What a [`SimulatedToken`] hands back from a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnStyle {
    /// A 32-byte ABI bool
    #[default]
    Standard,
    /// No return data; failures revert
    NonStandard,
    /// Return data that is neither empty nor a bool word
    Malformed,
}

/// Callback run during a transfer, before balances move: `(from, to, amount)`.
pub type TransferHook = Box<dyn Fn(Address, Address, U256)>;

/// Basis point denominator for transfer fees
const FEE_DENOMINATOR: u64 = 10_000;

/// In-memory token with configurable transfer semantics.
#[derive(Default)]
pub struct SimulatedToken {
    balances: RefCell<HashMap<Address, U256>>,
    fee_bps: Cell<u64>,
    return_style: Cell<ReturnStyle>,
    failing: Cell<bool>,
    hook: RefCell<Option<TransferHook>>,
}

impl fmt::Debug for SimulatedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedToken")
            .field("balances", &self.balances)
            .field("fee_bps", &self.fee_bps)
            .field("return_style", &self.return_style)
            .field("failing", &self.failing)
            .finish_non_exhaustive()
    }
}

impl SimulatedToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `fee_bps` basis points of every transfer; the fee is burned.
    pub fn with_fee_bps(self, fee_bps: u64) -> Self {
        self.fee_bps.set(fee_bps);
        self
    }

    pub fn with_return_style(self, style: ReturnStyle) -> Self {
        self.return_style.set(style);
        self
    }

    pub fn set_return_style(&self, style: ReturnStyle) {
        self.return_style.set(style);
    }

    /// Makes every subsequent transfer fail (bool `false` or revert).
    pub fn set_failing(&self, failing: bool) {
        self.failing.set(failing);
    }

    pub fn set_hook(&self, hook: TransferHook) {
        *self.hook.borrow_mut() = Some(hook);
    }

    pub fn clear_hook(&self) {
        self.hook.borrow_mut().take();
    }

    /// Credits `amount` to `account` out of thin air.
    pub fn mint(&self, account: Address, amount: U256) {
        let mut balances = self.balances.borrow_mut();
        let balance = balances.entry(account).or_insert(U256::ZERO);
        *balance = balance.saturating_add(amount);
    }

    fn run_hook(&self, from: Address, to: Address, amount: U256) {
        // Taken out for the call so the hook may touch this token again
        let hook = self.hook.borrow_mut().take();
        if let Some(hook) = hook {
            hook(from, to, amount);
            let mut slot = self.hook.borrow_mut();
            if slot.is_none() {
                *slot = Some(hook);
            }
        }
    }

    fn failure(&self, reason: &str) -> Result<Bytes, AssetRevert> {
        match self.return_style.get() {
            ReturnStyle::Standard => Ok(bool_word(false)),
            ReturnStyle::NonStandard | ReturnStyle::Malformed => Err(AssetRevert::new(reason)),
        }
    }

    fn success(&self) -> Bytes {
        match self.return_style.get() {
            ReturnStyle::Standard => bool_word(true),
            ReturnStyle::NonStandard => Bytes::new(),
            ReturnStyle::Malformed => Bytes::from(vec![1u8; 7]),
        }
    }

    fn move_balance(&self, from: Address, to: Address, amount: U256) -> Result<Bytes, AssetRevert> {
        if self.failing.get() {
            return self.failure("transfers disabled");
        }
        self.run_hook(from, to, amount);

        let mut balances = self.balances.borrow_mut();
        let available = balances.get(&from).copied().unwrap_or_default();
        if available < amount {
            drop(balances);
            return self.failure("insufficient balance");
        }
        let fee = amount.saturating_mul(U256::from(self.fee_bps.get())) / U256::from(FEE_DENOMINATOR);
        balances.insert(from, available - amount);
        let received = balances.entry(to).or_insert(U256::ZERO);
        *received = received.saturating_add(amount - fee);
        drop(balances);

        Ok(self.success())
    }
}

impl AssetToken for SimulatedToken {
    fn balance_of(&self, account: Address) -> U256 {
        self.balances
            .borrow()
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    fn transfer_from(&self, from: Address, to: Address, amount: U256) -> Result<Bytes, AssetRevert> {
        self.move_balance(from, to, amount)
    }

    fn transfer(&self, sender: Address, to: Address, amount: U256) -> Result<Bytes, AssetRevert> {
        self.move_balance(sender, to, amount)
    }
}

/// ABI encoding of a bool return value
fn bool_word(value: bool) -> Bytes {
    let word = if value { U256::from(1) } else { U256::ZERO };
    Bytes::from(word.to_be_bytes::<32>().to_vec())
}
