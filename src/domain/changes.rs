//! Historical percentage changes per held asset, in a chosen currency.

use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::domain::error::BalancerError;
use crate::domain::market::{pct_change, PricePoint, BTC, GBP, USD};
use crate::domain::timestamp;
use crate::ports::cache_port::CachePort;
use crate::ports::store_port::StorePort;

pub const CHANGES_TTL: StdDuration = StdDuration::from_secs(10 * 60);

pub fn cache_key(ccy: &str) -> String {
    format!("changes-{ccy}.json")
}

/// Currencies with stored USD rates. Anything else falls back to USD.
pub fn report_currency(raw: &str) -> &'static str {
    match raw.trim().to_uppercase().as_str() {
        GBP => GBP,
        BTC => BTC,
        _ => USD,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangePcts {
    pub h1: Option<f64>,
    pub d1: Option<f64>,
    pub d30: Option<f64>,
    pub d60: Option<f64>,
    pub d90: Option<f64>,
    pub d365: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetChange {
    pub ccy: String,
    pub latest: f64,
    pub pcts: ChangePcts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangesReport {
    pub ok: bool,
    pub ccy: String,
    pub changes: BTreeMap<String, AssetChange>,
}

/// Converts stored USD prices into `ccy` using the `ccy→USD` rate in force at
/// the price's own time.
struct Converter<'a> {
    store: &'a dyn StorePort,
    ccy: &'a str,
}

impl Converter<'_> {
    fn convert(
        &self,
        point: Option<PricePoint>,
        fx_at: NaiveDateTime,
    ) -> Result<Option<f64>, BalancerError> {
        let Some(point) = point else {
            return Ok(None);
        };
        if self.ccy == USD {
            return Ok(Some(point.price));
        }
        match self.store.fx_at_or_before(self.ccy, USD, fx_at)? {
            Some(fx) if fx > 0.0 => Ok(Some(point.price / fx)),
            _ => Ok(None),
        }
    }

    fn at_or_before(&self, asset_id: i64, at: NaiveDateTime) -> Result<Option<f64>, BalancerError> {
        let point = self.store.price_at_or_before(asset_id, USD, at)?;
        self.convert(point, at)
    }
}

/// Computes the report for all held active assets. Assets with no latest
/// price, or no usable rate for a non-USD currency, are left out.
pub fn compute_changes(
    store: &dyn StorePort,
    ccy: &str,
    portfolio: Option<&str>,
) -> Result<ChangesReport, BalancerError> {
    let ccy = ccy.trim().to_uppercase();
    let now = store.latest_price_time()?.unwrap_or_else(timestamp::now);
    let conv = Converter { store, ccy: &ccy };

    let mut changes = BTreeMap::new();
    for holding in store.holdings(portfolio)? {
        let id = holding.asset.id;
        let latest_point = store.latest_price(id, USD)?;
        let fx_at = latest_point.map_or(now, |p| p.at);
        let Some(latest) = conv.convert(latest_point, fx_at)? else {
            continue;
        };

        let earliest = store.earliest_price(id, USD)?;
        let max_ref = match earliest {
            Some(p) => conv.convert(Some(p), p.at)?,
            None => None,
        };

        let pcts = ChangePcts {
            h1: pct_change(latest, conv.at_or_before(id, now - Duration::hours(1))?),
            d1: pct_change(latest, conv.at_or_before(id, now - Duration::days(1))?),
            d30: pct_change(latest, conv.at_or_before(id, now - Duration::days(30))?),
            d60: pct_change(latest, conv.at_or_before(id, now - Duration::days(60))?),
            d90: pct_change(latest, conv.at_or_before(id, now - Duration::days(90))?),
            d365: pct_change(latest, conv.at_or_before(id, now - Duration::days(365))?),
            max: pct_change(latest, max_ref),
        };

        changes.insert(
            holding.asset.symbol.clone(),
            AssetChange {
                ccy: ccy.clone(),
                latest,
                pcts,
            },
        );
    }

    Ok(ChangesReport {
        ok: true,
        ccy,
        changes,
    })
}

/// Read-through wrapper around [`compute_changes`] with a ten minute cache.
/// `ccy` is narrowed by [`report_currency`] so the set of cache keys stays
/// fixed. Cache write failures are logged and otherwise ignored.
pub fn cached_changes(
    store: &dyn StorePort,
    cache: &dyn CachePort,
    ccy: &str,
    portfolio: Option<&str>,
) -> Result<ChangesReport, BalancerError> {
    let ccy = report_currency(ccy);
    let key = cache_key(ccy);

    if cache.age(&key).is_some_and(|age| age < CHANGES_TTL) {
        if let Some(report) = cache
            .load(&key)
            .and_then(|raw| serde_json::from_str::<ChangesReport>(&raw).ok())
        {
            log::debug!("serving {key} from cache");
            return Ok(report);
        }
    }

    let report = compute_changes(store, ccy, portfolio)?;
    match serde_json::to_string(&report) {
        Ok(raw) => {
            if let Err(e) = cache.store(&key, &raw) {
                log::warn!("failed to write {key}: {e}");
            }
        }
        Err(e) => log::warn!("failed to encode {key}: {e}"),
    }
    Ok(report)
}
