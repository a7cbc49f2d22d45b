//! Table formatting for rate curves.

use colored::Colorize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use super::format_percent;
use crate::commands::rates::RatePoint;

#[derive(Tabled)]
struct RateRow {
    #[tabled(rename = "Utilization")]
    utilization: String,
    #[tabled(rename = "Borrow Rate / Period")]
    borrow_rate: String,
    #[tabled(rename = "Borrow APR")]
    borrow_apr: String,
    #[tabled(rename = "Borrow APY")]
    borrow_apy: String,
    #[tabled(rename = "Supply APY")]
    supply_apy: String,
}

pub fn format_rate_curve_table(model: &str, curve: &[RatePoint]) -> String {
    let rows: Vec<RateRow> = curve
        .iter()
        .map(|point| RateRow {
            utilization: format_percent(point.utilization),
            borrow_rate: point.borrow_rate_per_period.to_string(),
            borrow_apr: format_percent(point.borrow_apr),
            borrow_apy: format_percent(point.borrow_apy),
            supply_apy: format_percent(point.supply_apy),
        })
        .collect();

    let mut table = Table::new(rows);
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()));

    format!("{} {}\n{}", "Rate model:".cyan().bold(), model, table)
}
