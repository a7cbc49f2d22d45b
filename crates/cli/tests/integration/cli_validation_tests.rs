//! CLI argument validation tests.
//!
//! These tests verify that the CLI properly validates arguments and input
//! files and reports helpful errors.

use predicates::prelude::*;

use super::helpers::{fixture_path, lendpool_cmd};

#[test]
fn test_help_output() {
    lendpool_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("lendpool"))
        .stdout(predicate::str::contains("rates"))
        .stdout(predicate::str::contains("simulate"));
}

#[test]
fn test_invalid_command() {
    lendpool_cmd()
        .arg("invalid_command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_rates_missing_market() {
    lendpool_cmd()
        .arg("rates")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_rates_zero_steps() {
    lendpool_cmd()
        .args(["rates", "--market", fixture_path("market").as_str(), "--steps", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_invalid_format() {
    lendpool_cmd()
        .args(["rates", "--market", fixture_path("market").as_str(), "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_missing_market_file() {
    lendpool_cmd()
        .args(["rates", "--market", "does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn test_unknown_script_op() {
    lendpool_cmd()
        .args([
            "simulate",
            "--market",
            fixture_path("market").as_str(),
            "--script",
            fixture_path("invalid_script").as_str(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse"));
}
