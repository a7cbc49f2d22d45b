//! Formatting for scenario replay reports.

use alloy_primitives::Address;
use colored::Colorize;
use lendpool_rs_core::math::wad_to_f64;
use lendpool_rs_core::MarketEvent;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use crate::scenario::{format_wad, SimulationReport};

#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Op")]
    op: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Result")]
    result: String,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Event")]
    name: &'static str,
    #[tabled(rename = "Details")]
    details: String,
}

#[derive(Tabled)]
struct AccountRowView {
    #[tabled(rename = "Account")]
    account: String,
    #[tabled(rename = "Asset Balance")]
    asset_balance: String,
    #[tabled(rename = "Shares")]
    shares: String,
    #[tabled(rename = "Debt")]
    debt: String,
}

fn truncate_address(addr: &Address) -> String {
    let addr = addr.to_string();
    if addr.len() > 10 {
        format!("{}...{}", &addr[..6], &addr[addr.len() - 4..])
    } else {
        addr
    }
}

fn describe_event(event: &MarketEvent) -> String {
    match event {
        MarketEvent::AccrueInterest {
            interest_accumulated,
            borrow_index,
            total_borrows,
            ..
        } => format!(
            "interest {}, index {}, borrows {}",
            format_wad(*interest_accumulated),
            format_wad(*borrow_index),
            format_wad(*total_borrows)
        ),
        MarketEvent::Supply {
            supplier,
            amount,
            shares,
        } => format!(
            "{} supplied {} for {} shares",
            truncate_address(supplier),
            format_wad(*amount),
            format_wad(*shares)
        ),
        MarketEvent::Withdraw {
            withdrawer,
            amount,
            shares,
        } => format!(
            "{} withdrew {} for {} shares",
            truncate_address(withdrawer),
            format_wad(*amount),
            format_wad(*shares)
        ),
        MarketEvent::Borrow {
            borrower,
            amount,
            account_borrows,
            ..
        } => format!(
            "{} borrowed {}, owes {}",
            truncate_address(borrower),
            format_wad(*amount),
            format_wad(*account_borrows)
        ),
        MarketEvent::RepayBorrow {
            payer,
            borrower,
            amount,
            account_borrows,
            ..
        } => format!(
            "{} repaid {} for {}, owes {}",
            truncate_address(payer),
            format_wad(*amount),
            truncate_address(borrower),
            format_wad(*account_borrows)
        ),
        MarketEvent::LiquidateBorrow {
            liquidator,
            borrower,
            repay_amount,
            seize_shares,
            ..
        } => format!(
            "{} repaid {} of {}, seized {} shares",
            truncate_address(liquidator),
            format_wad(*repay_amount),
            truncate_address(borrower),
            format_wad(*seize_shares)
        ),
        MarketEvent::Transfer { from, to, shares } => format!(
            "{} -> {}: {} shares",
            truncate_address(from),
            truncate_address(to),
            format_wad(*shares)
        ),
        MarketEvent::Approval {
            owner,
            spender,
            amount,
        } => format!(
            "{} approved {} for {}",
            truncate_address(owner),
            truncate_address(spender),
            format_wad(*amount)
        ),
        MarketEvent::ReservesAdded {
            amount,
            total_reserves,
            ..
        }
        | MarketEvent::ReservesReduced {
            amount,
            total_reserves,
            ..
        } => format!(
            "{}, reserves now {}",
            format_wad(*amount),
            format_wad(*total_reserves)
        ),
        MarketEvent::NewReserveFactor { old, new } => {
            format!("{} -> {}", format_wad(*old), format_wad(*new))
        }
        MarketEvent::NewInterestRateModel { old, new } => format!("{old} -> {new}"),
    }
}

fn rounded(table: &mut Table) -> String {
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::left()));
    table.to_string()
}

pub fn format_simulation_report(report: &SimulationReport) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n", "Steps".cyan().bold()));
    let steps: Vec<StepRow> = report
        .steps
        .iter()
        .map(|step| StepRow {
            index: step.index,
            op: step.op.to_string(),
            status: if step.status == 0 {
                "ok".green().to_string()
            } else {
                format!("error {}", step.status).red().to_string()
            },
            result: step
                .result
                .clone()
                .or_else(|| step.error.clone())
                .unwrap_or_default(),
        })
        .collect();
    output.push_str(&rounded(&mut Table::new(steps)));
    output.push_str("\n\n");

    output.push_str(&format!("{}\n", "Events".cyan().bold()));
    if report.events.is_empty() {
        output.push_str("  No events.\n\n");
    } else {
        let events: Vec<EventRow> = report
            .events
            .iter()
            .map(|event| EventRow {
                name: event.name(),
                details: describe_event(event),
            })
            .collect();
        output.push_str(&rounded(&mut Table::new(events)));
        output.push_str("\n\n");
    }

    let pool = &report.pool;
    output.push_str(&format!("{}\n", "Pool".cyan().bold()));
    output.push_str(&format!("  Accrued Through: period {}\n", pool.accrual_period));
    output.push_str(&format!("  Cash:            {}\n", format_wad(report.cash)));
    output.push_str(&format!("  Total Borrows:   {}\n", format_wad(pool.total_borrows)));
    output.push_str(&format!("  Total Reserves:  {}\n", format_wad(pool.total_reserves)));
    output.push_str(&format!("  Total Shares:    {}\n", format_wad(pool.total_supply)));
    output.push_str(&format!("  Borrow Index:    {}\n", format_wad(pool.borrow_index)));
    output.push_str(&format!(
        "  Exchange Rate:   {:.6}\n\n",
        wad_to_f64(report.exchange_rate)
    ));

    output.push_str(&format!("{}\n", "Accounts".cyan().bold()));
    if report.accounts.is_empty() {
        output.push_str("  No accounts.");
    } else {
        let accounts: Vec<AccountRowView> = report
            .accounts
            .iter()
            .map(|row| AccountRowView {
                account: truncate_address(&row.account),
                asset_balance: format_wad(row.asset_balance),
                shares: format_wad(row.shares),
                debt: format_wad(row.borrow_balance),
            })
            .collect();
        output.push_str(&rounded(&mut Table::new(accounts)));
    }

    output
}
