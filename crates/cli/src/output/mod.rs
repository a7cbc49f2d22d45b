//! Output formatting for CLI results.

pub mod rates;
pub mod simulation;

pub use rates::format_rate_curve_table;
pub use simulation::format_simulation_report;

fn format_percent(value: f64) -> String {
    format!("{:.2}%", value * 100.0)
}
