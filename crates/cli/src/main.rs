//! Lendpool CLI - explore rate curves and replay lending market scenarios.

mod cli;
mod commands;
mod output;
mod scenario;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{run_rates, run_simulate};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Rates(args) => {
            run_rates(&args, cli.format)?;
        }
        Commands::Simulate(args) => {
            run_simulate(&args, cli.format)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so table and JSON output stay clean on stdout.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
