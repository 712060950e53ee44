//! Coverage check of the stored price and FX history.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::domain::error::BalancerError;
use crate::domain::market::{BTC, GBP, USD};
use crate::domain::timestamp;
use crate::ports::store_port::{Bucket, StorePort};

/// Hourly buckets required in the last 24 hours.
pub const MIN_HOURLY_BUCKETS: usize = 20;
/// Daily buckets required in the last 365 days.
pub const MIN_DAILY_BUCKETS: usize = 300;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub hourly_24h_missing: usize,
    pub daily_1y_missing: usize,
}

impl Coverage {
    fn add(&mut self, hourly: usize, daily: usize) {
        if hourly < MIN_HOURLY_BUCKETS {
            self.hourly_24h_missing += 1;
        }
        if daily < MIN_DAILY_BUCKETS {
            self.daily_1y_missing += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub now: String,
    pub assets_total: usize,
    pub prices: Coverage,
    pub fx: BTreeMap<String, Coverage>,
}

/// Counts active assets (and the GBP/BTC rates) whose history is too sparse.
/// `now` is the newest stored price, or the wall clock for an empty store.
pub fn verify_health(store: &dyn StorePort) -> Result<HealthReport, BalancerError> {
    let now = store.latest_price_time()?.unwrap_or_else(timestamp::now);
    verify_health_at(store, now)
}

pub fn verify_health_at(
    store: &dyn StorePort,
    now: NaiveDateTime,
) -> Result<HealthReport, BalancerError> {
    let since_24h = now - Duration::hours(24);
    let since_1y = now - Duration::days(365);

    let asset_ids = store.active_asset_ids()?;
    let mut prices = Coverage::default();
    for &id in &asset_ids {
        prices.add(
            store.count_price_buckets(id, USD, since_24h, Bucket::Hour)?,
            store.count_price_buckets(id, USD, since_1y, Bucket::Day)?,
        );
    }

    let mut fx = BTreeMap::new();
    for base in [GBP, BTC] {
        let mut coverage = Coverage::default();
        coverage.add(
            store.count_fx_buckets(base, USD, since_24h, Bucket::Hour)?,
            store.count_fx_buckets(base, USD, since_1y, Bucket::Day)?,
        );
        fx.insert(format!("{base}{USD}"), coverage);
    }

    Ok(HealthReport {
        ok: true,
        now: timestamp::to_iso(now),
        assets_total: asset_ids.len(),
        prices,
        fx,
    })
}
