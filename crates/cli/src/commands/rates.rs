//! Rate curve command.

use alloy_primitives::U256;
use anyhow::Result;
use lendpool_rs_core::math::{rate_to_apr, rate_to_apy, wad_to_f64};
use lendpool_rs_core::{InterestRateModel, MarketParams, MathError, WAD};
use serde::Serialize;

use crate::cli::{OutputFormat, RatesArgs};
use crate::commands::load_json;
use crate::output::format_rate_curve_table;

/// Rates at one utilization level.
#[derive(Debug, Clone, Serialize)]
pub struct RatePoint {
    /// Fraction lent out, 0.0 to 1.0
    pub utilization: f64,
    pub borrow_rate_per_period: U256,
    pub supply_rate_per_period: U256,
    pub borrow_apr: f64,
    pub borrow_apy: f64,
    pub supply_apy: f64,
}

/// Samples the model at `steps + 1` evenly spaced utilization levels.
pub fn rate_curve(
    model: &dyn InterestRateModel,
    reserve_factor: U256,
    steps: u32,
) -> Result<Vec<RatePoint>, MathError> {
    let periods = model.periods_per_year();
    (0..=steps)
        .map(|step| {
            // A unit pool: borrows + cash = WAD, so utilization equals borrows
            let borrows = WAD * U256::from(step) / U256::from(steps);
            let cash = WAD - borrows;
            let borrow_rate = model.borrow_rate(cash, borrows, U256::ZERO)?;
            let supply_rate = model.supply_rate(cash, borrows, U256::ZERO, reserve_factor)?;
            Ok(RatePoint {
                utilization: wad_to_f64(borrows),
                borrow_rate_per_period: borrow_rate,
                supply_rate_per_period: supply_rate,
                borrow_apr: rate_to_apr(borrow_rate, periods),
                borrow_apy: rate_to_apy(borrow_rate, periods),
                supply_apy: rate_to_apy(supply_rate, periods),
            })
        })
        .collect()
}

pub fn run_rates(args: &RatesArgs, format: OutputFormat) -> Result<()> {
    let params: MarketParams = load_json(&args.market)?;
    let config = params.market_config()?;
    let model = params.rate_model.build()?;
    let curve = rate_curve(model.as_ref(), config.reserve_factor, args.steps)?;

    match format {
        OutputFormat::Table => {
            println!("{}", format_rate_curve_table(model.name(), &curve));
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&curve)?;
            println!("{}", json);
        }
    }

    Ok(())
}
