//! Single-entry lock for mutating market operations.

use std::cell::Cell;

use serde::Serialize;

use crate::error::{MarketError, Result};

/// Lock state of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    #[default]
    Idle,
    InProgress,
}

/// Rejects a mutating call while another one is in flight on the same market.
#[derive(Debug, Default)]
pub struct ReentrancyGuard {
    state: Cell<GuardState>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> GuardState {
        self.state.get()
    }

    /// Moves to `InProgress` until the returned token is dropped.
    ///
    /// # Errors
    ///
    /// [`MarketError::Reentrancy`] if an operation is already in flight.
    pub fn enter(&self) -> Result<GuardToken<'_>> {
        if self.state.get() == GuardState::InProgress {
            return Err(MarketError::Reentrancy);
        }
        self.state.set(GuardState::InProgress);
        Ok(GuardToken { guard: self })
    }
}

/// Held for the duration of one operation; releases the guard on every exit path.
#[must_use = "the guard is released as soon as the token is dropped"]
#[derive(Debug)]
pub struct GuardToken<'a> {
    guard: &'a ReentrancyGuard,
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        self.guard.state.set(GuardState::Idle);
    }
}
