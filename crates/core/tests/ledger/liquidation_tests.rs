//! Liquidation scenarios, same-market and cross-market.

use std::rc::Rc;

use alloy_primitives::U256;
use lendpool_rs_core::{
    Action, AssetToken, LiquidationOutcome, MarketConfig, MarketError, MarketEvent, MathError,
    Rejection, SimulatedToken, StaticRiskEngine, WAD,
};

use super::helpers::*;

/// A borrowed market and a separate collateral market sharing one risk engine.
struct CrossMarkets {
    borrowed: TestMarket,
    collateral: TestMarket,
}

fn create_cross_markets(borrowed_token: SimulatedToken) -> CrossMarkets {
    let risk = Rc::new(StaticRiskEngine::new());
    let config = MarketConfig::new().with_initial_exchange_rate(WAD);

    let borrowed_token = Rc::new(borrowed_token);
    let borrowed = create_market(
        MARKET_ID,
        MARKET_ADDRESS,
        config,
        flat_model(0),
        &risk,
        &borrowed_token,
    );
    let collateral_token = Rc::new(SimulatedToken::new());
    let collateral = create_market(
        COLLATERAL_ID,
        COLLATERAL_ADDRESS,
        config,
        flat_model(0),
        &risk,
        &collateral_token,
    );

    CrossMarkets {
        borrowed: TestMarket {
            market: borrowed,
            token: borrowed_token,
            risk: risk.clone(),
        },
        collateral: TestMarket {
            market: collateral,
            token: collateral_token,
            risk,
        },
    }
}

/// BOB posts `collateral` in the collateral market, borrows 1000 against
/// ALICE's 3000 and falls into shortfall. The liquidator holds `liquidator_funds`.
fn setup_underwater_borrower(markets: &CrossMarkets, collateral: U256, liquidator_funds: U256) {
    markets.collateral.fund_and_supply(1, BOB, collateral);
    markets.borrowed.fund_and_supply(1, ALICE, units(3_000));
    markets.borrowed.market.borrow(1, BOB, units(1_000)).unwrap();
    markets.borrowed.risk.set_shortfall(BOB, true);
    markets.borrowed.token.mint(LIQUIDATOR, liquidator_funds);
}

#[test]
fn test_same_market_liquidation_exact_split() {
    let t = create_test_market();
    t.fund_and_supply(1, BOB, units(2_000));
    t.fund_and_supply(1, ALICE, units(3_000));
    t.market.borrow(1, BOB, units(1_000)).unwrap();
    t.risk.set_shortfall(BOB, true);
    t.token.mint(LIQUIDATOR, units(500));

    let outcome = t
        .market
        .liquidate(1, LIQUIDATOR, BOB, units(500), &t.market)
        .unwrap();

    // 500 * 1.08 = 540 shares seized, 2.8% of which go to reserves:
    // 540 * 0.028 = 15.12 to the protocol, 524.88 to the liquidator
    let protocol = U256::from(15_120_000_000_000_000_000u128);
    let to_liquidator = U256::from(524_880_000_000_000_000_000u128);
    assert_eq!(
        outcome,
        LiquidationOutcome {
            repay_amount: units(500),
            seize_shares: units(540),
            liquidator_shares: to_liquidator,
            protocol_shares: protocol,
        }
    );

    assert_eq!(t.market.share_balance(BOB), units(1_460));
    assert_eq!(t.market.share_balance(LIQUIDATOR), to_liquidator);
    assert_eq!(t.market.borrow_balance_stored(BOB).unwrap(), units(500));
    assert_eq!(t.token.balance_of(LIQUIDATOR), U256::ZERO);

    let pool = t.market.pool();
    assert_eq!(pool.total_reserves, protocol);
    assert_eq!(pool.total_supply, units(5_000) - protocol);
    assert_eq!(pool.total_borrows, units(500));
    // Burning the protocol's shares into reserves leaves the rate unchanged
    assert_eq!(t.market.exchange_rate_stored().unwrap(), WAD);

    assert_eq!(t.market.events().last().map(MarketEvent::name), Some("LiquidateBorrow"));
}

#[test]
fn test_cross_market_liquidation() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(2_000), units(500));
    let borrowed = &markets.borrowed.market;
    let collateral = &markets.collateral.market;

    let outcome = borrowed
        .liquidate(1, LIQUIDATOR, BOB, units(500), collateral)
        .unwrap();
    assert_eq!(outcome.seize_shares, units(540));

    // Debt side
    assert_eq!(borrowed.borrow_balance_stored(BOB).unwrap(), units(500));
    assert_eq!(borrowed.cash(), units(2_500));
    assert_eq!(borrowed.pool().total_reserves, U256::ZERO);

    // Collateral side
    let protocol = U256::from(15_120_000_000_000_000_000u128);
    assert_eq!(collateral.share_balance(BOB), units(1_460));
    assert_eq!(collateral.share_balance(LIQUIDATOR), units(540) - protocol);
    assert_eq!(collateral.pool().total_reserves, protocol);
    assert_eq!(collateral.pool().total_supply, units(2_000) - protocol);

    let events = collateral.events();
    let tail: Vec<&MarketEvent> = events.iter().rev().take(3).collect();
    assert_eq!(
        tail,
        vec![
            &MarketEvent::ReservesAdded {
                benefactor: COLLATERAL_ADDRESS,
                amount: protocol,
                total_reserves: protocol,
            },
            &MarketEvent::Transfer {
                from: BOB,
                to: COLLATERAL_ADDRESS,
                shares: protocol,
            },
            &MarketEvent::Transfer {
                from: BOB,
                to: LIQUIDATOR,
                shares: units(540) - protocol,
            },
        ]
    );
}

#[test]
fn test_seize_arithmetic_failure_is_not_a_denial() {
    let risk = Rc::new(StaticRiskEngine::new());
    let token = Rc::new(SimulatedToken::new());
    let borrowed = create_market(
        MARKET_ID,
        MARKET_ADDRESS,
        MarketConfig::new().with_initial_exchange_rate(WAD),
        flat_model(0),
        &risk,
        &token,
    );
    // Default 0.02 exchange rate at a 1 wei price: price * rate floors to zero
    let collateral = create_market(
        COLLATERAL_ID,
        COLLATERAL_ADDRESS,
        MarketConfig::new(),
        flat_model(0),
        &risk,
        &Rc::new(SimulatedToken::new()),
    );
    risk.list_market(COLLATERAL_ID, U256::from(1));

    token.mint(ALICE, units(3_000));
    borrowed.supply(1, ALICE, units(3_000)).unwrap();
    borrowed.borrow(1, BOB, units(1_000)).unwrap();
    risk.set_shortfall(BOB, true);
    token.mint(LIQUIDATOR, units(1));

    let err = borrowed
        .liquidate(1, LIQUIDATOR, BOB, units(1), &collateral)
        .unwrap_err();
    assert_eq!(err, MarketError::Arithmetic(MathError::DivisionByZero));
    assert!(!err.is_retryable());

    // Nothing moved
    assert_eq!(borrowed.borrow_balance_stored(BOB).unwrap(), units(1_000));
    assert_eq!(token.balance_of(LIQUIDATOR), units(1));
    assert_eq!(borrowed.cash(), units(2_000));
}

#[test]
fn test_liquidation_accrues_collateral_market() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(2_000), units(500));

    markets
        .borrowed
        .market
        .liquidate(7, LIQUIDATOR, BOB, units(500), &markets.collateral.market)
        .unwrap();
    assert_eq!(markets.collateral.market.pool().accrual_period, 7);
}

#[test]
fn test_seize_recomputed_from_received_amount() {
    // The borrowed asset keeps 1% of every transfer
    let markets = create_cross_markets(SimulatedToken::new().with_fee_bps(100));
    setup_underwater_borrower(&markets, units(2_000), units(500));

    let outcome = markets
        .borrowed
        .market
        .liquidate(1, LIQUIDATOR, BOB, units(500), &markets.collateral.market)
        .unwrap();

    // Only 495 arrives, so 495 * 1.08 = 534.6 shares are seized
    assert_eq!(outcome.repay_amount, units(495));
    assert_eq!(outcome.seize_shares, U256::from(534_600_000_000_000_000_000u128));
    assert_eq!(
        markets.borrowed.market.borrow_balance_stored(BOB).unwrap(),
        units(505)
    );
}

#[test]
fn test_close_factor_bounds_repay() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(2_000), units(501));

    let result = markets.borrowed.market.liquidate(
        1,
        LIQUIDATOR,
        BOB,
        units(501),
        &markets.collateral.market,
    );
    assert_eq!(
        result,
        Err(MarketError::PermissionDenied {
            action: Action::Liquidate,
            rejection: Rejection::TooMuchRepay {
                repay: units(501),
                max: units(500),
            },
        })
    );
    assert_eq!(markets.borrowed.token.balance_of(LIQUIDATOR), units(501));
}

#[test]
fn test_healthy_borrower_not_liquidatable() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(2_000), units(500));
    markets.borrowed.risk.set_shortfall(BOB, false);

    let result = markets.borrowed.market.liquidate(
        1,
        LIQUIDATOR,
        BOB,
        units(100),
        &markets.collateral.market,
    );
    assert_eq!(
        result,
        Err(MarketError::PermissionDenied {
            action: Action::Liquidate,
            rejection: Rejection::NotInShortfall(BOB),
        })
    );
}

#[test]
fn test_failed_seize_rolls_back_repay() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(2_000), units(500));
    markets.collateral.risk.pause(COLLATERAL_ID, Action::Seize);
    let borrowed_pool = markets.borrowed.market.pool();

    let result = markets.borrowed.market.liquidate(
        1,
        LIQUIDATOR,
        BOB,
        units(500),
        &markets.collateral.market,
    );
    assert_eq!(
        result,
        Err(MarketError::PermissionDenied {
            action: Action::Seize,
            rejection: Rejection::ActionPaused(Action::Seize),
        })
    );

    // Debt, cash and the liquidator's funds are back where they started
    assert_eq!(markets.borrowed.market.pool(), borrowed_pool);
    assert_eq!(
        markets.borrowed.market.borrow_balance_stored(BOB).unwrap(),
        units(1_000)
    );
    assert_eq!(markets.borrowed.token.balance_of(LIQUIDATOR), units(500));
    assert_eq!(markets.borrowed.market.cash(), units(2_000));
    assert_eq!(markets.collateral.market.share_balance(BOB), units(2_000));
    assert!(!markets
        .borrowed
        .market
        .events()
        .iter()
        .any(|event| matches!(event, MarketEvent::LiquidateBorrow { .. })));
}

#[test]
fn test_insufficient_collateral_checked_before_repay() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(100), units(500));

    let result = markets.borrowed.market.liquidate(
        1,
        LIQUIDATOR,
        BOB,
        units(500),
        &markets.collateral.market,
    );
    assert_eq!(
        result,
        Err(MarketError::InsufficientCollateral {
            borrower: BOB,
            have: units(100),
            need: units(540),
        })
    );
    assert_eq!(markets.borrowed.token.balance_of(LIQUIDATOR), units(500));
}

#[test]
fn test_liquidation_input_validation() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(2_000), units(500));
    let borrowed = &markets.borrowed.market;
    let collateral = &markets.collateral.market;

    assert_eq!(
        borrowed.liquidate(1, BOB, BOB, units(1), collateral),
        Err(MarketError::LiquidatorIsBorrower { account: BOB })
    );
    assert_eq!(
        borrowed.liquidate(1, LIQUIDATOR, BOB, U256::ZERO, collateral),
        Err(MarketError::ZeroAmount)
    );
    assert_eq!(
        borrowed.liquidate(1, LIQUIDATOR, BOB, U256::MAX, collateral),
        Err(MarketError::InvalidRepayAmount)
    );
}

#[test]
fn test_direct_seize_requires_listed_seizer() {
    let markets = create_cross_markets(SimulatedToken::new());
    setup_underwater_borrower(&markets, units(2_000), units(500));
    let unlisted = alloy_primitives::FixedBytes::repeat_byte(0x99);

    let result = markets
        .collateral
        .market
        .seize(1, unlisted, LIQUIDATOR, BOB, units(1));
    assert_eq!(
        result,
        Err(MarketError::PermissionDenied {
            action: Action::Seize,
            rejection: Rejection::MarketNotListed(unlisted),
        })
    );
}
