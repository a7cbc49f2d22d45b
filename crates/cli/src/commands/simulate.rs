//! Scenario replay command.

use anyhow::Result;
use lendpool_rs_core::MarketParams;

use crate::cli::{OutputFormat, SimulateArgs};
use crate::commands::load_json;
use crate::output::format_simulation_report;
use crate::scenario::{self, Script};

pub fn run_simulate(args: &SimulateArgs, format: OutputFormat) -> Result<()> {
    let params: MarketParams = load_json(&args.market)?;
    let script: Script = load_json(&args.script)?;
    let report = scenario::run(&params, &script)?;

    match format {
        OutputFormat::Table => {
            println!("{}", format_simulation_report(&report));
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report)?;
            println!("{}", json);
        }
    }

    Ok(())
}
