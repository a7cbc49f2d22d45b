//! Scripted market scenarios.
//!
//! A script is a JSON list of steps replayed in order against a single
//! in-memory market. Amounts are whole units of an 18-decimal asset written as
//! decimal strings. A failing step is recorded with its status code and the
//! replay moves on to the next one.
//!
//! ```json
//! {
//!   "asset_fee_bps": 0,
//!   "steps": [
//!     { "op": "mint_asset", "account": "0x00000000000000000000000000000000000000a1", "amount": "1000" },
//!     { "op": "supply", "period": 1, "account": "0x00000000000000000000000000000000000000a1", "amount": "1000" }
//!   ]
//! }
//! ```

use std::collections::BTreeSet;
use std::rc::Rc;

use alloy_primitives::{Address, FixedBytes, U256};
use anyhow::Result;
use lendpool_rs_core::config::decimal_to_wad;
use lendpool_rs_core::{
    AssetToken, Market, MarketError, MarketEvent, MarketId, MarketParams, PoolState, RepayAmount,
    SimulatedToken, StaticRiskEngine, WAD,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Identity of the simulated market
pub const MARKET_ID: MarketId = FixedBytes::repeat_byte(0x01);

/// Account holding the simulated market's cash
pub const MARKET_ADDRESS: Address = Address::repeat_byte(0xCC);

/// A replayable sequence of operations.
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    /// Fee the simulated asset takes from every transfer, in basis points
    #[serde(default)]
    pub asset_fee_bps: u64,
    pub steps: Vec<Step>,
}

/// One scripted operation.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    MintAsset {
        account: Address,
        amount: Decimal,
    },
    Supply {
        period: u64,
        account: Address,
        amount: Decimal,
    },
    Withdraw {
        period: u64,
        account: Address,
        shares: Decimal,
    },
    WithdrawUnderlying {
        period: u64,
        account: Address,
        amount: Decimal,
    },
    Borrow {
        period: u64,
        account: Address,
        amount: Decimal,
    },
    Repay {
        period: u64,
        account: Address,
        amount: Decimal,
    },
    RepayMax {
        period: u64,
        account: Address,
    },
    Accrue {
        period: u64,
    },
    SetShortfall {
        account: Address,
        in_shortfall: bool,
    },
    /// Same-market liquidation: the market is both debt and collateral
    Liquidate {
        period: u64,
        liquidator: Address,
        borrower: Address,
        amount: Decimal,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MintAsset { .. } => "mint_asset",
            Self::Supply { .. } => "supply",
            Self::Withdraw { .. } => "withdraw",
            Self::WithdrawUnderlying { .. } => "withdraw_underlying",
            Self::Borrow { .. } => "borrow",
            Self::Repay { .. } => "repay",
            Self::RepayMax { .. } => "repay_max",
            Self::Accrue { .. } => "accrue",
            Self::SetShortfall { .. } => "set_shortfall",
            Self::Liquidate { .. } => "liquidate",
        }
    }

    /// Accounts this step touches.
    fn accounts(&self) -> Vec<Address> {
        match self {
            Self::MintAsset { account, .. }
            | Self::Supply { account, .. }
            | Self::Withdraw { account, .. }
            | Self::WithdrawUnderlying { account, .. }
            | Self::Borrow { account, .. }
            | Self::Repay { account, .. }
            | Self::RepayMax { account, .. }
            | Self::SetShortfall { account, .. } => vec![*account],
            Self::Liquidate {
                liquidator,
                borrower,
                ..
            } => vec![*liquidator, *borrower],
            Self::Accrue { .. } => Vec::new(),
        }
    }
}

/// What happened when a step ran.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// 1-based position in the script
    pub index: usize,
    pub op: &'static str,
    /// 0 on success, otherwise the ledger's status code
    pub status: u32,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Final position of one account.
#[derive(Debug, Clone, Serialize)]
pub struct AccountRow {
    pub account: Address,
    pub asset_balance: U256,
    pub shares: U256,
    pub borrow_balance: U256,
}

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub steps: Vec<StepOutcome>,
    pub events: Vec<MarketEvent>,
    pub pool: PoolState,
    pub cash: U256,
    pub exchange_rate: U256,
    pub accounts: Vec<AccountRow>,
}

/// A single market with its in-memory collaborators.
struct Simulation {
    market: Market,
    token: Rc<SimulatedToken>,
    risk: Rc<StaticRiskEngine>,
}

impl Simulation {
    fn new(params: &MarketParams, asset_fee_bps: u64) -> Result<Self> {
        let config = params.market_config()?;
        let model = params.rate_model.build()?;
        let token = Rc::new(SimulatedToken::new().with_fee_bps(asset_fee_bps));
        let risk = Rc::new(StaticRiskEngine::new());
        risk.list_market(MARKET_ID, WAD);

        let market = Market::new(
            MARKET_ID,
            MARKET_ADDRESS,
            config,
            model,
            risk.clone(),
            token.clone(),
            0,
        )?;
        Ok(Self {
            market,
            token,
            risk,
        })
    }

    fn apply(&self, step: &Step) -> Result<String, MarketError> {
        let market = &self.market;
        match step {
            Step::MintAsset { account, amount } => {
                self.token.mint(*account, decimal_to_wad(*amount)?);
                Ok(format!("minted {amount}"))
            }
            Step::Supply {
                period,
                account,
                amount,
            } => {
                let shares = market.supply(*period, *account, decimal_to_wad(*amount)?)?;
                Ok(format!("minted {} shares", format_wad(shares)))
            }
            Step::Withdraw {
                period,
                account,
                shares,
            } => {
                let amount = market.withdraw(*period, *account, decimal_to_wad(*shares)?)?;
                Ok(format!("received {}", format_wad(amount)))
            }
            Step::WithdrawUnderlying {
                period,
                account,
                amount,
            } => {
                let shares = market.withdraw_underlying(*period, *account, decimal_to_wad(*amount)?)?;
                Ok(format!("burned {} shares", format_wad(shares)))
            }
            Step::Borrow {
                period,
                account,
                amount,
            } => {
                market.borrow(*period, *account, decimal_to_wad(*amount)?)?;
                let debt = market.borrow_balance_stored(*account)?;
                Ok(format!("debt {}", format_wad(debt)))
            }
            Step::Repay {
                period,
                account,
                amount,
            } => {
                let amount = RepayAmount::Exact(decimal_to_wad(*amount)?);
                let repaid = market.repay(*period, *account, amount)?;
                Ok(format!("repaid {}", format_wad(repaid)))
            }
            Step::RepayMax { period, account } => {
                let repaid = market.repay(*period, *account, RepayAmount::Max)?;
                Ok(format!("repaid {}", format_wad(repaid)))
            }
            Step::Accrue { period } => {
                market.accrue_interest(*period)?;
                Ok(format!("borrow index {}", format_wad(market.pool().borrow_index)))
            }
            Step::SetShortfall {
                account,
                in_shortfall,
            } => {
                self.risk.set_shortfall(*account, *in_shortfall);
                Ok(format!("shortfall {in_shortfall}"))
            }
            Step::Liquidate {
                period,
                liquidator,
                borrower,
                amount,
            } => {
                let outcome = market.liquidate(
                    *period,
                    *liquidator,
                    *borrower,
                    decimal_to_wad(*amount)?,
                    market,
                )?;
                Ok(format!(
                    "seized {} shares ({} to liquidator)",
                    format_wad(outcome.seize_shares),
                    format_wad(outcome.liquidator_shares)
                ))
            }
        }
    }
}

/// Replays `script` against a fresh market built from `params`.
pub fn run(params: &MarketParams, script: &Script) -> Result<SimulationReport> {
    let simulation = Simulation::new(params, script.asset_fee_bps)?;
    let mut accounts = BTreeSet::new();
    let mut steps = Vec::with_capacity(script.steps.len());

    for (position, step) in script.steps.iter().enumerate() {
        accounts.extend(step.accounts());
        let index = position + 1;
        let outcome = match simulation.apply(step) {
            Ok(result) => StepOutcome {
                index,
                op: step.name(),
                status: 0,
                result: Some(result),
                error: None,
            },
            Err(err) => {
                warn!(step = index, op = step.name(), error = %err, "step failed");
                StepOutcome {
                    index,
                    op: step.name(),
                    status: err.status_code(),
                    result: None,
                    error: Some(err.to_string()),
                }
            }
        };
        steps.push(outcome);
    }

    let market = &simulation.market;
    let accounts = accounts
        .into_iter()
        .map(|account| {
            Ok(AccountRow {
                account,
                asset_balance: simulation.token.balance_of(account),
                shares: market.share_balance(account),
                borrow_balance: market.borrow_balance_stored(account)?,
            })
        })
        .collect::<Result<Vec<_>, MarketError>>()?;

    Ok(SimulationReport {
        steps,
        events: market.events(),
        pool: market.pool(),
        cash: market.cash(),
        exchange_rate: market.exchange_rate_stored()?,
        accounts,
    })
}

/// Renders a WAD-scaled value as a decimal, falling back to the raw mantissa.
pub fn format_wad(value: U256) -> String {
    lendpool_rs_core::config::wad_to_decimal(value)
        .map_or_else(|| value.to_string(), |decimal| decimal.to_string())
}
