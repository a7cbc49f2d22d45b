//! Reserve and parameter management.

use std::rc::Rc;

use alloy_primitives::U256;
use lendpool_rs_core::{
    AssetToken, InterestRateModel, LinearRateModel, MarketError, MarketEvent, WAD,
};

use super::helpers::*;

#[test]
fn test_add_reserves_keeps_exchange_rate() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(100));
    t.token.mint(BOB, units(5));

    let added = t.market.add_reserves(2, BOB, units(5)).unwrap();
    assert_eq!(added, units(5));
    assert_eq!(t.market.pool().total_reserves, units(5));
    assert_eq!(t.market.cash(), units(105));
    assert_eq!(t.market.exchange_rate_stored().unwrap(), WAD);
}

#[test]
fn test_reduce_reserves() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(100));
    t.token.mint(BOB, units(5));
    t.market.add_reserves(1, BOB, units(5)).unwrap();

    let result = t.market.reduce_reserves(1, BOB, units(6));
    assert_eq!(
        result,
        Err(MarketError::InsufficientReserves {
            have: units(5),
            need: units(6),
        })
    );

    t.market.reduce_reserves(1, BOB, units(2)).unwrap();
    assert_eq!(t.market.pool().total_reserves, units(3));
    assert_eq!(t.token.balance_of(BOB), units(2));
    assert_eq!(
        t.market.events().last(),
        Some(&MarketEvent::ReservesReduced {
            to: BOB,
            amount: units(2),
            total_reserves: units(3),
        })
    );
}

#[test]
fn test_reduce_reserves_restored_when_transfer_fails() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(100));
    t.token.mint(BOB, units(5));
    t.market.add_reserves(1, BOB, units(5)).unwrap();
    t.token.set_failing(true);

    let result = t.market.reduce_reserves(1, BOB, units(5));
    assert!(matches!(result, Err(MarketError::TransferOutFailed { .. })));
    assert_eq!(t.market.pool().total_reserves, units(5));
}

#[test]
fn test_reserve_factor_changes_after_accrual() {
    let t = create_test_market_with(flat_model(1_000_000_000_000), Default::default());
    t.fund_and_supply(1, ALICE, units(1_000));
    t.market.borrow(1, BOB, units(100)).unwrap();

    // Interest for periods 1..101 accrues at the old factor of zero
    t.market
        .set_reserve_factor(101, U256::from(500_000_000_000_000_000u64))
        .unwrap();
    assert_eq!(t.market.pool().total_reserves, U256::ZERO);
    assert_eq!(
        t.market.pool().reserve_factor,
        U256::from(500_000_000_000_000_000u64)
    );

    // The next 100 periods route half of the interest to reserves
    t.market.accrue_interest(201).unwrap();
    assert!(t.market.pool().total_reserves > U256::ZERO);

    let result = t.market.set_reserve_factor(201, WAD + U256::from(1));
    assert_eq!(
        result,
        Err(MarketError::InvalidReserveFactor {
            factor: WAD + U256::from(1),
        })
    );
}

#[test]
fn test_swap_rate_model() {
    let t = create_test_market_with(flat_model(1_000_000_000_000), Default::default());
    t.fund_and_supply(1, ALICE, units(1_000));
    t.market.borrow(1, BOB, units(100)).unwrap();

    let linear = LinearRateModel::from_annual(U256::ZERO, U256::ZERO, 1_000).unwrap();
    t.market.set_interest_rate_model(101, Rc::new(linear)).unwrap();

    // Accrued under the old model up to the swap, nothing afterwards
    let borrows = t.market.pool().total_borrows;
    assert_eq!(borrows, units(100) + U256::from(10_000_000_000_000_000u64));
    t.market.accrue_interest(500).unwrap();
    assert_eq!(t.market.pool().total_borrows, borrows);

    assert_eq!(t.market.rate_model().name(), "linear");
    assert!(t.market.events().contains(&MarketEvent::NewInterestRateModel {
        old: "jump".to_string(),
        new: "linear".to_string(),
    }));
}
