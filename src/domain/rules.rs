//! Take-profit ladder and drift rebalance rules.
//!
//! Each fired rule appends an entry to the alert log and records an alert row
//! used for the cool-off check on later runs.

use std::collections::HashMap;

use chrono::{Duration, NaiveDateTime};
use serde_json::json;

use crate::domain::alert::{AlertEntry, SEVERITY_INFO};
use crate::domain::error::BalancerError;
use crate::domain::market::USD;
use crate::domain::portfolio::Holding;
use crate::domain::valuation::{gbp_to_usd, position_cost_basis_usd, position_market_value_usd};
use crate::ports::alert_port::AlertPort;
use crate::ports::store_port::{AlertRecord, StorePort};

pub const REBALANCE_KIND: &str = "rebalance_suggested";
/// Fraction of the position suggested for sale at each ladder step.
pub const TAKE_PROFIT_FRACTION: f64 = 0.33;

pub fn take_profit_kind(multiple: f64) -> String {
    format!("take_profit_{}x_value", multiple.trunc() as i64)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSettings {
    pub ladder: Vec<f64>,
    pub cooloff: Duration,
}

impl From<&crate::domain::settings::RuleSettings> for RuleSettings {
    fn from(configured: &crate::domain::settings::RuleSettings) -> Self {
        Self {
            ladder: configured.take_profit_ladder.clone(),
            cooloff: Duration::days(configured.cooloff_days),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub take_profit: usize,
    pub rebalance: usize,
}

struct Context<'a> {
    store: &'a dyn StorePort,
    alerts: &'a dyn AlertPort,
    portfolio_id: i64,
    now: NaiveDateTime,
}

impl Context<'_> {
    fn record(&self, asset_id: i64, kind: &str, message: &str) -> Result<(), BalancerError> {
        self.store.insert_alert(&AlertRecord {
            portfolio_id: self.portfolio_id,
            asset_id,
            kind: kind.to_string(),
            message: message.to_string(),
            payload_json: None,
            severity: SEVERITY_INFO.to_string(),
            at: self.now,
        })
    }
}

fn evaluate_take_profit(
    ctx: &Context<'_>,
    holding: &Holding,
    gbp_usd: Option<f64>,
    settings: &RuleSettings,
) -> Result<usize, BalancerError> {
    let position = &holding.position;
    if !position.is_open() {
        return Ok(0);
    }
    let mv = position_market_value_usd(ctx.store, holding, gbp_usd)?;
    let cb = position_cost_basis_usd(position, gbp_usd);
    let (Some(mv), Some(cb)) = (mv, cb) else {
        return Ok(0);
    };
    if cb <= 0.0 {
        return Ok(0);
    }

    let multiple = mv / cb;
    let since = ctx.now - settings.cooloff;
    let mut fired = 0;
    for &step in settings.ladder.iter().filter(|&&m| multiple >= m) {
        let kind = take_profit_kind(step);
        if ctx
            .store
            .alert_exists_since(ctx.portfolio_id, holding.asset.id, &kind, since)?
        {
            log::debug!("{} {kind} within cool-off", holding.asset.symbol);
            continue;
        }
        let qty = position.coins * TAKE_PROFIT_FRACTION;
        ctx.alerts.append(&AlertEntry::info(
            "take_profit",
            format!(
                "{}: Value >= {step:.1}x cost. Consider selling 33% (~{qty:.6} units)",
                holding.asset.symbol
            ),
            json!({
                "asset_id": holding.asset.id,
                "portfolio_id": ctx.portfolio_id,
                "multiple": step,
                "qty_suggested": qty,
                "mv_usd": mv,
                "cb_usd": cb,
            }),
        ))?;
        ctx.record(holding.asset.id, &kind, "suggested take profit")?;
        fired += 1;
    }
    Ok(fired)
}

fn evaluate_drift(
    ctx: &Context<'_>,
    holdings: &[Holding],
    gbp_usd: Option<f64>,
) -> Result<usize, BalancerError> {
    let targets: HashMap<i64, _> = ctx
        .store
        .targets(ctx.portfolio_id)?
        .into_iter()
        .map(|t| (t.asset_id, t))
        .collect();
    if targets.is_empty() {
        return Ok(0);
    }

    let mut mv_by_asset = HashMap::new();
    for holding in holdings {
        if let Some(mv) = position_market_value_usd(ctx.store, holding, gbp_usd)? {
            mv_by_asset.insert(holding.asset.id, mv);
        }
    }
    let total: f64 = mv_by_asset.values().sum();
    if total <= 0.0 {
        return Ok(0);
    }

    let mut fired = 0;
    for holding in holdings {
        let asset_id = holding.asset.id;
        let Some(target) = targets.get(&asset_id) else {
            continue;
        };
        let mv = mv_by_asset.get(&asset_id).copied().unwrap_or(0.0);
        let drift = mv / total - target.target_weight;
        if drift.abs() < target.effective_band() {
            continue;
        }
        let diff = target.target_weight * total - mv;
        if diff.abs() < target.effective_min_trade() {
            continue;
        }

        let side = if diff > 0.0 { "BUY" } else { "SELL" };
        let price = ctx.store.latest_price(asset_id, USD)?.map_or(0.0, |p| p.price);
        let qty = if price > 0.0 { diff.abs() / price } else { 0.0 };
        ctx.alerts.append(&AlertEntry::info(
            "rebalance",
            format!(
                "{}: Drift {:+.2}%. {side} ~${:.2} (~{qty:.6} units)",
                holding.asset.symbol,
                drift * 100.0,
                diff.abs()
            ),
            json!({
                "asset_id": asset_id,
                "portfolio_id": ctx.portfolio_id,
                "drift": drift,
                "side": side,
                "trade_value_usd": diff.abs(),
                "qty_suggested": qty,
            }),
        ))?;
        ctx.record(asset_id, REBALANCE_KIND, "suggested rebalance")?;
        fired += 1;
    }
    Ok(fired)
}

/// Evaluates both rules for the named portfolio. A missing portfolio is not
/// an error; nothing fires.
pub fn run_rules(
    store: &dyn StorePort,
    alerts: &dyn AlertPort,
    portfolio: &str,
    settings: &RuleSettings,
    now: NaiveDateTime,
) -> Result<RuleOutcome, BalancerError> {
    let Some(pf) = store.find_portfolio(portfolio)? else {
        log::warn!("portfolio {portfolio} not found, no rules evaluated");
        return Ok(RuleOutcome::default());
    };
    let holdings = store.holdings(Some(portfolio))?;
    let gbp_usd = gbp_to_usd(store)?;
    let ctx = Context {
        store,
        alerts,
        portfolio_id: pf.id,
        now,
    };

    let mut outcome = RuleOutcome::default();
    for holding in &holdings {
        outcome.take_profit += evaluate_take_profit(&ctx, holding, gbp_usd, settings)?;
    }
    outcome.rebalance = evaluate_drift(&ctx, &holdings, gbp_usd)?;
    log::info!(
        "rules fired: {} take-profit, {} rebalance",
        outcome.take_profit,
        outcome.rebalance
    );
    Ok(outcome)
}
