//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Lendpool CLI - explore rate models and replay market scenarios offline
#[derive(Parser, Debug)]
#[command(name = "lendpool")]
#[command(about = "CLI for exploring lending market rate curves and scenarios", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    /// Log ledger activity at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print borrow and supply rates across the utilization range
    Rates(RatesArgs),
    /// Replay a scripted sequence of operations against an in-memory market
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
pub struct RatesArgs {
    /// Market parameters file (JSON)
    #[arg(long)]
    pub market: PathBuf,

    /// Number of utilization steps between 0% and 100%
    #[arg(long, default_value = "10", value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub steps: u32,
}

#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Market parameters file (JSON)
    #[arg(long)]
    pub market: PathBuf,

    /// Operation script file (JSON)
    #[arg(long)]
    pub script: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}
