//! Scenario replay command tests.

use alloy_primitives::U256;
use predicates::prelude::*;

use super::helpers::{fixture_path, lendpool_cmd, run_json};

const WAD: u128 = 1_000_000_000_000_000_000;

fn simulate(script: &str) -> serde_json::Value {
    run_json(lendpool_cmd().args([
        "simulate",
        "--market",
        fixture_path("market").as_str(),
        "--script",
        fixture_path(script).as_str(),
    ]))
}

fn u256(value: &serde_json::Value) -> U256 {
    serde_json::from_value(value.clone()).unwrap()
}

#[test]
fn test_simulate_table_output() {
    lendpool_cmd()
        .args([
            "simulate",
            "--market",
            fixture_path("market").as_str(),
            "--script",
            fixture_path("script").as_str(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Steps"))
        .stdout(predicate::str::contains("minted 1000 shares"))
        .stdout(predicate::str::contains("seized 108 shares (104.976 to liquidator)"))
        .stdout(predicate::str::contains("error 10"))
        .stdout(predicate::str::contains("LiquidateBorrow"))
        .stdout(predicate::str::contains("Accounts"));
}

#[test]
fn test_simulate_step_statuses() {
    let json = simulate("script");
    let statuses: Vec<u64> = json["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|step| step["status"].as_u64().unwrap())
        .collect();

    // Only the oversized borrow fails, with InsufficientCash
    assert_eq!(statuses, vec![0, 0, 0, 0, 0, 10, 0, 0, 0, 0]);
    assert!(json["steps"][5]["error"]
        .as_str()
        .unwrap()
        .contains("Insufficient cash"));
}

#[test]
fn test_simulate_final_state_after_liquidation() {
    let json = simulate("script");

    let pool = &json["pool"];
    assert_eq!(u256(&pool["total_borrows"]), U256::ZERO);
    // 2.8% of the 108 seized shares went to reserves
    assert_eq!(u256(&pool["total_reserves"]), U256::from(3_024_000_000_000_000_000u128));
    assert_eq!(u256(&json["cash"]), U256::from(1_500 * WAD));
    assert_eq!(u256(&json["exchange_rate"]), U256::from(WAD));

    let accounts = json["accounts"].as_array().unwrap();
    assert_eq!(accounts.len(), 3);
    let borrower = accounts
        .iter()
        .find(|row| {
            row["account"]
                .as_str()
                .unwrap()
                .eq_ignore_ascii_case("0x00000000000000000000000000000000000000b0")
        })
        .unwrap();
    assert_eq!(u256(&borrower["shares"]), U256::from(392 * WAD));
    assert_eq!(u256(&borrower["borrow_balance"]), U256::ZERO);
    assert_eq!(u256(&borrower["asset_balance"]), U256::from(100 * WAD));
}

#[test]
fn test_simulate_events_in_order() {
    let json = simulate("script");
    let names: Vec<&str> = json["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|event| event["event"].as_str().unwrap())
        .collect();

    assert!(names.contains(&"supply"));
    let liquidation = names.iter().position(|name| *name == "liquidate_borrow").unwrap();
    assert_eq!(names[liquidation - 1], "repay_borrow");
    assert_eq!(names.last(), Some(&"repay_borrow"));
}

#[test]
fn test_simulate_interest_accrues_over_periods() {
    let json = simulate("interest_script");
    let steps = json["steps"].as_array().unwrap();

    assert_eq!(steps[3]["status"], 0);
    // Accruing backwards in time is rejected
    assert_eq!(steps[4]["status"], 2);

    let pool = &json["pool"];
    assert_eq!(pool["accrual_period"], 1001);
    assert!(u256(&pool["borrow_index"]) > U256::from(WAD));
    assert!(u256(&pool["total_borrows"]) > U256::from(500 * WAD));
    // 10% of the interest is held back as reserves
    assert!(u256(&pool["total_reserves"]) > U256::ZERO);
}
