//! Price ingestion from market snapshots.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::NaiveDateTime;

use crate::domain::asset::{AssetUpsert, BTC_COINGECKO_ID, USDC_COINGECKO_ID};
use crate::domain::error::BalancerError;
use crate::domain::market::{FxRate, MarketRow, NewPrice, BTC, GBP, USD};
use crate::ports::market_port::MarketDataPort;
use crate::ports::store_port::StorePort;

/// Coingecko ids listed on the first line of the mapping file. A missing
/// file yields no ids.
pub fn read_mapping_ids(path: &Path) -> Result<Vec<String>, BalancerError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(content
        .lines()
        .next()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect())
}

/// Ids to fetch: the held assets' Coingecko ids, else the mapping file.
pub fn ids_to_fetch(
    store: &dyn StorePort,
    mapping_file: Option<&Path>,
) -> Result<Vec<String>, BalancerError> {
    let held = store.held_coingecko_ids(None)?;
    if !held.is_empty() {
        return Ok(held);
    }
    match mapping_file {
        Some(path) => read_mapping_ids(path),
        None => Ok(Vec::new()),
    }
}

/// Ensures an asset exists for each market row and returns `coingecko id →
/// asset id`. Matches by Coingecko id, then symbol; fills a missing
/// Coingecko id but never replaces an existing one.
pub fn upsert_assets_for_markets(
    store: &dyn StorePort,
    rows: &[MarketRow],
) -> Result<BTreeMap<String, i64>, BalancerError> {
    let mut ids = BTreeMap::new();
    for row in rows {
        if row.id.is_empty() {
            continue;
        }
        let symbol = row.symbol.trim().to_uppercase();
        let existing = match store.find_asset_by_coingecko_id(&row.id)? {
            Some(asset) => Some(asset),
            None if !symbol.is_empty() => store.find_asset_by_symbol(&symbol)?,
            None => None,
        };
        let asset_id = match existing {
            Some(asset) => {
                if asset.coingecko_id.as_deref().is_none_or(str::is_empty) {
                    store.set_coingecko_id(asset.id, &row.id)?;
                }
                asset.id
            }
            None if symbol.is_empty() => {
                log::warn!("market row {} has no symbol, skipping", row.id);
                continue;
            }
            None => {
                let name = if row.name.trim().is_empty() { &symbol } else { &row.name };
                store
                    .upsert_asset(
                        &AssetUpsert::new(&symbol)
                            .name(name.as_str())
                            .coingecko_id(Some(row.id.clone())),
                    )?
                    .id
            }
        };
        ids.insert(row.id.clone(), asset_id);
    }
    Ok(ids)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StoredPrices {
    pub stored: usize,
    pub btc_usd: Option<f64>,
    pub gbp_usd: Option<f64>,
}

fn finite_price(row: Option<&MarketRow>) -> Option<f64> {
    row.and_then(|r| r.current_price).filter(|p| p.is_finite())
}

fn is_coin(row: &MarketRow, symbol: &str, coingecko_id: &str) -> bool {
    row.symbol.eq_ignore_ascii_case(symbol) || row.id == coingecko_id
}

/// Stores USD and GBP prices at `now`, plus a GBP→USD rate derived from
/// USDC when both its prices are present.
pub fn store_prices(
    store: &dyn StorePort,
    assets: &BTreeMap<String, i64>,
    usd_rows: &[MarketRow],
    gbp_rows: &[MarketRow],
    now: NaiveDateTime,
) -> Result<StoredPrices, BalancerError> {
    let usd: HashMap<&str, &MarketRow> = usd_rows.iter().map(|r| (r.id.as_str(), r)).collect();
    let gbp: HashMap<&str, &MarketRow> = gbp_rows.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut prices = Vec::new();
    let mut btc_usd = None;
    let mut usdc_usd = None;
    let mut usdc_gbp = None;

    for (cg_id, &asset_id) in assets {
        let u = usd.get(cg_id.as_str()).copied();
        let g = gbp.get(cg_id.as_str()).copied();
        if let (Some(row), Some(price)) = (u, finite_price(u)) {
            prices.push(NewPrice { asset_id, ccy: USD.into(), price, at: now });
            if is_coin(row, "btc", BTC_COINGECKO_ID) {
                btc_usd = Some(price);
            }
            if is_coin(row, "usdc", USDC_COINGECKO_ID) {
                usdc_usd = Some(price);
            }
        }
        if let (Some(row), Some(price)) = (g, finite_price(g)) {
            prices.push(NewPrice { asset_id, ccy: GBP.into(), price, at: now });
            if is_coin(row, "usdc", USDC_COINGECKO_ID) {
                usdc_gbp = Some(price);
            }
        }
    }

    let stored = store.insert_prices(&prices)?;
    let gbp_usd = match (usdc_usd, usdc_gbp) {
        (Some(u), Some(g)) if u > 0.0 && g > 0.0 => {
            let rate = u / g;
            store.insert_fx_rates(&[FxRate {
                base_ccy: GBP.into(),
                quote_ccy: USD.into(),
                rate,
                at: now,
            }])?;
            Some(rate)
        }
        _ => None,
    };

    Ok(StoredPrices { stored, btc_usd: btc_usd.filter(|p| *p > 0.0), gbp_usd })
}

/// Stores every asset's price in BTC and the BTC→USD rate.
pub fn derive_btc_prices(
    store: &dyn StorePort,
    assets: &BTreeMap<String, i64>,
    usd_rows: &[MarketRow],
    btc_usd: f64,
    now: NaiveDateTime,
) -> Result<usize, BalancerError> {
    if btc_usd <= 0.0 || !btc_usd.is_finite() {
        return Ok(0);
    }
    let usd: HashMap<&str, &MarketRow> = usd_rows.iter().map(|r| (r.id.as_str(), r)).collect();
    let prices: Vec<NewPrice> = assets
        .iter()
        .filter_map(|(cg_id, &asset_id)| {
            finite_price(usd.get(cg_id.as_str()).copied()).map(|price| NewPrice {
                asset_id,
                ccy: BTC.into(),
                price: price / btc_usd,
                at: now,
            })
        })
        .collect();
    let stored = store.insert_prices(&prices)?;
    store.insert_fx_rates(&[FxRate {
        base_ccy: BTC.into(),
        quote_ccy: USD.into(),
        rate: btc_usd,
        at: now,
    }])?;
    Ok(stored)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceFetchReport {
    pub ids: usize,
    pub stored: usize,
    pub btc_stored: usize,
    pub gbp_usd: Option<f64>,
}

/// One ingestion cycle: fetch USD and GBP markets for `ids`, upsert assets,
/// store prices, derive BTC prices.
pub fn run_price_fetch(
    store: &dyn StorePort,
    market: &dyn MarketDataPort,
    ids: &[String],
    now: NaiveDateTime,
) -> Result<PriceFetchReport, BalancerError> {
    if ids.is_empty() {
        log::warn!("no coingecko ids to fetch");
        return Ok(PriceFetchReport::default());
    }
    let usd_rows = market.markets(ids, "usd")?;
    let gbp_rows = market.markets(ids, "gbp")?;
    log::info!(
        "fetched {} usd and {} gbp market rows for {} ids",
        usd_rows.len(),
        gbp_rows.len(),
        ids.len()
    );

    let basis = if usd_rows.is_empty() { &gbp_rows } else { &usd_rows };
    let assets = upsert_assets_for_markets(store, basis)?;
    let stored = store_prices(store, &assets, &usd_rows, &gbp_rows, now)?;
    let btc_stored = match stored.btc_usd {
        Some(btc_usd) => derive_btc_prices(store, &assets, &usd_rows, btc_usd, now)?,
        None => 0,
    };

    Ok(PriceFetchReport {
        ids: ids.len(),
        stored: stored.stored,
        btc_stored,
        gbp_usd: stored.gbp_usd,
    })
}
