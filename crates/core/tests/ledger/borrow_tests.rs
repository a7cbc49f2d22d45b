//! Borrow, accrual and repay scenarios.

use std::rc::Rc;

use alloy_primitives::U256;
use lendpool_rs_core::{
    Action, AssetToken, BorrowSnapshot, MarketConfig, MarketError, MarketEvent, Rejection,
    RepayAmount, SimulatedToken, StaticRiskEngine, WAD,
};

use super::helpers::*;

/// 1e12 per period with 10% of interest routed to reserves
fn create_interest_market() -> TestMarket {
    let risk = Rc::new(StaticRiskEngine::new());
    let token = Rc::new(SimulatedToken::new());
    let config = MarketConfig::new()
        .with_initial_exchange_rate(WAD)
        .with_reserve_factor(U256::from(100_000_000_000_000_000u64));
    let market = create_market(
        MARKET_ID,
        MARKET_ADDRESS,
        config,
        flat_model(1_000_000_000_000),
        &risk,
        &token,
    );
    TestMarket { market, token, risk }
}

#[test]
fn test_borrow_transfers_and_records_debt() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(1_000));

    t.market.borrow(1, BOB, units(100)).unwrap();
    assert_eq!(t.token.balance_of(BOB), units(100));
    assert_eq!(t.market.cash(), units(900));
    assert_eq!(t.market.pool().total_borrows, units(100));
    assert_eq!(
        t.market.borrow_snapshot(BOB),
        BorrowSnapshot {
            principal: units(100),
            interest_index: WAD,
        }
    );
}

#[test]
fn test_interest_accrues_over_periods() {
    let t = create_interest_market();
    t.fund_and_supply(1, ALICE, units(1_000));
    t.market.borrow(1, BOB, units(100)).unwrap();

    t.market.accrue_interest(101).unwrap();
    let pool = t.market.pool();

    // factor = 1e12 * 100 = 1e14, interest = 100 * 1e-4 = 0.01
    assert_eq!(pool.total_borrows, units(100) + U256::from(10_000_000_000_000_000u64));
    assert_eq!(pool.total_reserves, U256::from(1_000_000_000_000_000u64));
    assert_eq!(pool.borrow_index, WAD + U256::from(100_000_000_000_000u64));
    assert_eq!(
        t.market.borrow_balance_stored(BOB).unwrap(),
        units(100) + U256::from(10_000_000_000_000_000u64)
    );
    // (900 + 100.01 - 0.001) / 1000
    assert_eq!(
        t.market.exchange_rate_stored().unwrap(),
        U256::from(1_000_009_000_000_000_000u64)
    );
}

#[test]
fn test_second_borrow_rolls_interest_into_principal() {
    let t = create_interest_market();
    t.fund_and_supply(1, ALICE, units(1_000));
    t.market.borrow(1, BOB, units(100)).unwrap();
    t.market.borrow(101, BOB, units(50)).unwrap();

    assert_eq!(
        t.market.borrow_snapshot(BOB),
        BorrowSnapshot {
            principal: units(150) + U256::from(10_000_000_000_000_000u64),
            interest_index: WAD + U256::from(100_000_000_000_000u64),
        }
    );
}

#[test]
fn test_repay_max_clears_debt() {
    let t = create_interest_market();
    t.fund_and_supply(1, ALICE, units(1_000));
    t.market.borrow(1, BOB, units(100)).unwrap();
    t.token.mint(BOB, units(1));

    let repaid = t.market.repay(101, BOB, RepayAmount::Max).unwrap();
    assert_eq!(repaid, units(100) + U256::from(10_000_000_000_000_000u64));
    assert_eq!(t.market.borrow_balance_stored(BOB).unwrap(), U256::ZERO);
    assert_eq!(t.market.borrow_snapshot(BOB), BorrowSnapshot::default());
    assert_eq!(t.market.pool().total_borrows, U256::ZERO);

    let last = t.market.events().pop().unwrap();
    assert_eq!(
        last,
        MarketEvent::RepayBorrow {
            payer: BOB,
            borrower: BOB,
            amount: repaid,
            account_borrows: U256::ZERO,
            total_borrows: U256::ZERO,
        }
    );
}

#[test]
fn test_partial_repay_on_behalf() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(1_000));
    t.market.borrow(1, BOB, units(100)).unwrap();
    t.token.mint(ALICE, units(40));

    let repaid = t
        .market
        .repay_on_behalf(2, ALICE, BOB, RepayAmount::Exact(units(40)))
        .unwrap();
    assert_eq!(repaid, units(40));
    assert_eq!(t.market.borrow_balance_stored(BOB).unwrap(), units(60));
    assert_eq!(t.token.balance_of(ALICE), U256::ZERO);
    assert_eq!(t.token.balance_of(BOB), units(100));
}

#[test]
fn test_repay_exceeds_debt() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(1_000));
    t.market.borrow(1, BOB, units(100)).unwrap();
    t.token.mint(BOB, units(1));

    let result = t.market.repay(1, BOB, RepayAmount::Exact(units(101)));
    assert_eq!(
        result,
        Err(MarketError::RepayExceedsDebt {
            borrower: BOB,
            amount: units(101),
            debt: units(100),
        })
    );
}

#[test]
fn test_repay_without_debt() {
    let t = create_test_market();
    let result = t.market.repay(1, BOB, RepayAmount::Max);
    assert_eq!(result, Err(MarketError::ZeroAmount));
}

#[test]
fn test_borrow_limited_by_cash() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(10));

    let result = t.market.borrow(1, BOB, units(11));
    assert_eq!(
        result,
        Err(MarketError::InsufficientCash {
            have: units(10),
            need: units(11),
        })
    );
}

#[test]
fn test_shortfall_blocks_borrow() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(10));
    t.risk.set_shortfall(BOB, true);

    let result = t.market.borrow(1, BOB, units(1));
    assert_eq!(
        result,
        Err(MarketError::PermissionDenied {
            action: Action::Borrow,
            rejection: Rejection::InsufficientLiquidity(BOB),
        })
    );
}

#[test]
fn test_borrow_restored_when_transfer_fails() {
    let t = create_test_market();
    t.fund_and_supply(1, ALICE, units(10));
    t.token.set_failing(true);

    let result = t.market.borrow(1, BOB, units(5));
    assert!(matches!(result, Err(MarketError::TransferOutFailed { .. })));
    assert_eq!(t.market.borrow_snapshot(BOB), BorrowSnapshot::default());
    assert_eq!(t.market.pool().total_borrows, U256::ZERO);
}

#[test]
fn test_rate_above_ceiling_blocks_accrual() {
    // 6e12 per period is above the default 5e12 ceiling
    let t = create_test_market_with(flat_model(6_000_000_000_000), SimulatedToken::new());

    let result = t.market.accrue_interest(1);
    assert_eq!(
        result,
        Err(MarketError::RateTooHigh {
            rate: U256::from(6_000_000_000_000u64),
            max: U256::from(5_000_000_000_000u64),
        })
    );
    assert_eq!(t.market.pool().accrual_period, 0);
}

#[test]
fn test_regressing_period_rejected() {
    let t = create_test_market();
    t.market.accrue_interest(10).unwrap();

    t.token.mint(ALICE, units(1));
    let result = t.market.supply(5, ALICE, units(1));
    assert_eq!(result, Err(MarketError::InvalidPeriod { now: 5, last: 10 }));
}
