//! Historical backfill from market charts.

use std::collections::BTreeMap;

use crate::domain::asset::{AssetUpsert, BTC_COINGECKO_ID, USDC_COINGECKO_ID};
use crate::domain::error::BalancerError;
use crate::domain::market::{FxRate, NewPrice, BTC, GBP, USD};
use crate::domain::timestamp;
use crate::ports::market_port::{ChartSeries, MarketDataPort};
use crate::ports::store_port::StorePort;

/// Longest range requested from the chart endpoint.
pub const MAX_DAYS: &str = "365";

/// `"max"` (any case) is clamped to [`MAX_DAYS`]; blank means the default.
pub fn normalize_days(days: &str) -> String {
    let days = days.trim();
    if days.is_empty() || days.eq_ignore_ascii_case("max") {
        MAX_DAYS.to_string()
    } else {
        days.to_string()
    }
}

/// Pairs every USD point with the GBP point nearest in time and returns
/// `(millis, usd / gbp)`. Both series must be in ascending time order.
pub fn pair_nearest(usd: &ChartSeries, gbp: &ChartSeries) -> Vec<(i64, f64)> {
    if gbp.is_empty() {
        return Vec::new();
    }
    let mut j = 0;
    let mut out = Vec::with_capacity(usd.len());
    for &(t, usd_price) in usd {
        while j + 1 < gbp.len() && (gbp[j + 1].0 - t).abs() <= (gbp[j].0 - t).abs() {
            j += 1;
        }
        let gbp_price = gbp[j].1;
        if usd_price != 0.0 && gbp_price != 0.0 {
            out.push((t, usd_price / gbp_price));
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackfillReport {
    pub btc_fx: usize,
    pub gbp_fx: usize,
    pub prices: usize,
    pub failed: Vec<String>,
}

fn to_rates(series: &[(i64, f64)], base: &str) -> Vec<FxRate> {
    series
        .iter()
        .filter_map(|&(ms, rate)| {
            timestamp::from_millis(ms).map(|at| FxRate {
                base_ccy: base.into(),
                quote_ccy: USD.into(),
                rate,
                at,
            })
        })
        .collect()
}

/// Maps each Coingecko id to the asset carrying it, creating a placeholder
/// asset (symbol from the id) when none does. Ids whose placeholder symbol is
/// already taken by another asset are pushed to `failed`.
fn assets_for_ids(
    store: &dyn StorePort,
    ids: &[String],
    failed: &mut Vec<String>,
) -> Result<BTreeMap<String, i64>, BalancerError> {
    let mut assets = BTreeMap::new();
    for id in ids.iter().filter(|id| !id.is_empty()) {
        if let Some(asset) = store.find_asset_by_coingecko_id(id)? {
            assets.insert(id.clone(), asset.id);
            continue;
        }
        let symbol = id.chars().take(10).collect::<String>().to_uppercase();
        if store.find_asset_by_symbol(&symbol)?.is_some() {
            log::warn!("no asset carries {id} and symbol {symbol} is taken, skipping");
            failed.push(id.clone());
            continue;
        }
        let asset = store.upsert_asset(
            &AssetUpsert::new(&symbol)
                .name(id.as_str())
                .coingecko_id(Some(id.clone())),
        )?;
        assets.insert(id.clone(), asset.id);
    }
    Ok(assets)
}

/// Stores BTC→USD and GBP→USD history plus each id's USD price history.
///
/// A chart that cannot be fetched for an individual asset is logged and
/// recorded in `failed`; the FX charts are required.
pub fn backfill(
    store: &dyn StorePort,
    market: &dyn MarketDataPort,
    ids: &[String],
    days: &str,
) -> Result<BackfillReport, BalancerError> {
    let days = normalize_days(days);
    let mut report = BackfillReport::default();
    if ids.is_empty() {
        log::warn!("no coingecko ids to backfill");
        return Ok(report);
    }

    let assets = assets_for_ids(store, ids, &mut report.failed)?;

    let btc_usd = market.market_chart(BTC_COINGECKO_ID, "usd", &days)?;
    report.btc_fx = store.insert_fx_rates(&to_rates(&btc_usd, BTC))?;

    let usdc_usd = market.market_chart(USDC_COINGECKO_ID, "usd", &days)?;
    let usdc_gbp = market.market_chart(USDC_COINGECKO_ID, "gbp", &days)?;
    report.gbp_fx = store.insert_fx_rates(&to_rates(&pair_nearest(&usdc_usd, &usdc_gbp), GBP))?;

    for (cg_id, &asset_id) in &assets {
        let chart = match market.market_chart(cg_id, "usd", &days) {
            Ok(chart) => chart,
            Err(e) => {
                log::warn!("backfill of {cg_id} failed: {e}");
                report.failed.push(cg_id.clone());
                continue;
            }
        };
        let prices: Vec<NewPrice> = chart
            .iter()
            .filter_map(|&(ms, price)| {
                timestamp::from_millis(ms).map(|at| NewPrice {
                    asset_id,
                    ccy: USD.into(),
                    price,
                    at,
                })
            })
            .collect();
        report.prices += store.insert_prices(&prices)?;
    }

    log::info!(
        "backfill ({days}d): {} prices, {} btc fx, {} gbp fx, {} failed",
        report.prices,
        report.btc_fx,
        report.gbp_fx,
        report.failed.len()
    );
    Ok(report)
}
