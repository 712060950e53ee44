//! Portfolio valuation: market value, cost basis and currency conversion.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::domain::asset::USDC_COINGECKO_ID;
use crate::domain::error::BalancerError;
use crate::domain::market::{BTC, GBP, USD};
use crate::domain::portfolio::{Holding, Position};
use crate::domain::timestamp;
use crate::ports::store_port::StorePort;

/// Latest GBP→USD rate.
///
/// Prefers a stored FX row; otherwise derives the rate from the latest USDC
/// prices in USD and GBP.
pub fn gbp_to_usd(store: &dyn StorePort) -> Result<Option<f64>, BalancerError> {
    if let Some(rate) = store.latest_fx(GBP, USD)? {
        if rate > 0.0 {
            return Ok(Some(rate));
        }
    }

    let usdc = match store.find_asset_by_symbol("USDC")? {
        Some(asset) => Some(asset),
        None => store.find_asset_by_coingecko_id(USDC_COINGECKO_ID)?,
    };
    let Some(usdc) = usdc else {
        return Ok(None);
    };

    let usd = store.latest_price(usdc.id, USD)?.map(|p| p.price);
    let gbp = store.latest_price(usdc.id, GBP)?.map(|p| p.price);
    Ok(match (usd, gbp) {
        (Some(usd), Some(gbp)) if usd > 0.0 && gbp > 0.0 => Some(usd / gbp),
        _ => None,
    })
}

/// Market value in USD from the latest USD price, falling back to the latest
/// GBP price converted at `gbp_usd`.
pub fn position_market_value_usd(
    store: &dyn StorePort,
    holding: &Holding,
    gbp_usd: Option<f64>,
) -> Result<Option<f64>, BalancerError> {
    let coins = holding.position.coins;
    if let Some(p) = store.latest_price(holding.asset.id, USD)? {
        return Ok(Some(p.price * coins));
    }
    let gbp = store.latest_price(holding.asset.id, GBP)?;
    Ok(match (gbp, gbp_usd) {
        (Some(p), Some(rate)) => Some(p.price * rate * coins),
        _ => None,
    })
}

/// Cost basis in USD. GBP costs need a rate; any other currency is taken as USD.
pub fn position_cost_basis_usd(position: &Position, gbp_usd: Option<f64>) -> Option<f64> {
    let cost = position.cost_basis();
    if position.avg_cost_ccy.eq_ignore_ascii_case(GBP) {
        gbp_usd.map(|rate| cost * rate)
    } else {
        Some(cost)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetValuation {
    pub symbol: String,
    pub name: String,
    pub coingecko_id: Option<String>,
    pub is_stable: bool,
    pub is_fiat: bool,
    pub coins: f64,
    pub price_usd: f64,
    pub price_gbp: f64,
    pub price_btc: f64,
    pub mv_usd: f64,
    pub mv_gbp: f64,
    pub mv_btc: f64,
    pub cb_usd: f64,
}

impl AssetValuation {
    fn new(holding: &Holding, price_usd: f64, price_gbp: f64, price_btc: f64) -> Self {
        let coins = holding.position.coins;
        Self {
            symbol: holding.asset.symbol.clone(),
            name: holding.asset.name.clone(),
            coingecko_id: holding.asset.coingecko_id.clone(),
            is_stable: holding.asset.is_stable,
            is_fiat: holding.asset.is_fiat,
            coins,
            price_usd,
            price_gbp,
            price_btc,
            mv_usd: coins * price_usd,
            mv_gbp: coins * price_gbp,
            mv_btc: coins * price_btc,
            cb_usd: holding.position.cost_basis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioView {
    pub as_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<String>,
    pub assets: Vec<AssetValuation>,
    pub total_mv_usd: f64,
    pub total_mv_gbp: f64,
    pub total_mv_btc: f64,
}

impl PortfolioView {
    fn from_assets(as_of: Option<NaiveDateTime>, assets: Vec<AssetValuation>) -> Self {
        Self {
            as_of: as_of.map(timestamp::to_iso),
            portfolio: None,
            total_mv_usd: assets.iter().map(|a| a.mv_usd).sum(),
            total_mv_gbp: assets.iter().map(|a| a.mv_gbp).sum(),
            total_mv_btc: assets.iter().map(|a| a.mv_btc).sum(),
            assets,
        }
    }
}

fn latest_or_zero(store: &dyn StorePort, asset_id: i64, ccy: &str) -> Result<f64, BalancerError> {
    Ok(store.latest_price(asset_id, ccy)?.map_or(0.0, |p| p.price))
}

/// Holdings valued at their latest stored USD, GBP and BTC prices.
pub fn portfolio_view(
    store: &dyn StorePort,
    portfolio: Option<&str>,
) -> Result<PortfolioView, BalancerError> {
    let as_of = store.latest_price_time()?;
    let mut assets = Vec::new();
    for holding in store.holdings(portfolio)? {
        let id = holding.asset.id;
        assets.push(AssetValuation::new(
            &holding,
            latest_or_zero(store, id, USD)?,
            latest_or_zero(store, id, GBP)?,
            latest_or_zero(store, id, BTC)?,
        ));
    }
    Ok(PortfolioView::from_assets(as_of, assets))
}

/// Like [`portfolio_view`] but GBP and BTC prices are derived from the latest
/// USD price and the latest GBP→USD / BTC→USD rates.
pub fn export_view(store: &dyn StorePort, portfolio: &str) -> Result<PortfolioView, BalancerError> {
    let as_of = store.latest_price_time()?;
    let gbp_usd = store.latest_fx(GBP, USD)?.unwrap_or(0.0);
    let btc_usd = store.latest_fx(BTC, USD)?.unwrap_or(0.0);
    let convert = |usd: f64, rate: f64| if rate > 0.0 { usd / rate } else { 0.0 };

    let mut assets = Vec::new();
    for holding in store.holdings(Some(portfolio))? {
        let price_usd = latest_or_zero(store, holding.asset.id, USD)?;
        assets.push(AssetValuation::new(
            &holding,
            price_usd,
            convert(price_usd, gbp_usd),
            convert(price_usd, btc_usd),
        ));
    }
    let mut view = PortfolioView::from_assets(as_of, assets);
    view.portfolio = Some(portfolio.to_string());
    Ok(view)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    pub total_gbp: f64,
    pub cost_basis_gbp: f64,
    pub net_gbp: f64,
    pub delta_1d_gbp: f64,
    pub delta_1m_gbp: f64,
    pub pct_1d_gbp: f64,
    pub pct_1m_gbp: f64,
}

fn delta(total: f64, reference: f64) -> f64 {
    if total != 0.0 && reference != 0.0 {
        total - reference
    } else {
        0.0
    }
}

fn pct(delta: f64, reference: f64) -> f64 {
    if reference != 0.0 {
        delta / reference * 100.0
    } else {
        0.0
    }
}

/// GBP totals across every active holding with one-day and one-month deltas.
pub fn summary(store: &dyn StorePort, now: NaiveDateTime) -> Result<Summary, BalancerError> {
    let t1d = now - Duration::days(1);
    let t1m = now - Duration::days(30);

    let mut total = 0.0;
    let mut total_1d = 0.0;
    let mut total_1m = 0.0;
    let mut cost_basis = 0.0;

    for holding in store.holdings(None)? {
        let id = holding.asset.id;
        let coins = holding.position.coins;
        let current = store.latest_price(id, GBP)?;
        if let Some(p) = current {
            total += coins * p.price;
        }
        if let Some(p) = store.price_at_or_before(id, GBP, t1d)? {
            total_1d += coins * p.price;
        }
        if let Some(p) = store.price_at_or_before(id, GBP, t1m)? {
            total_1m += coins * p.price;
        }

        let cb_usd = holding.position.cost_basis();
        if cb_usd != 0.0 {
            let p_usd = store.latest_price(id, USD)?.map_or(0.0, |p| p.price);
            let p_gbp = current.map_or(0.0, |p| p.price);
            let usd_per_gbp = if p_gbp > 0.0 { p_usd / p_gbp } else { 0.0 };
            if usd_per_gbp > 0.0 {
                cost_basis += cb_usd / usd_per_gbp;
            }
        }
    }

    let delta_1d = delta(total, total_1d);
    let delta_1m = delta(total, total_1m);
    Ok(Summary {
        total_gbp: total,
        cost_basis_gbp: cost_basis,
        net_gbp: total - cost_basis,
        delta_1d_gbp: delta_1d,
        delta_1m_gbp: delta_1m,
        pct_1d_gbp: pct(delta_1d, total_1d),
        pct_1m_gbp: pct(delta_1m, total_1m),
    })
}
