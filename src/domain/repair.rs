//! Carry-forward gap filling for USD prices and GBP/BTC rates.

use chrono::{Duration, NaiveDateTime};

use crate::domain::error::BalancerError;
use crate::domain::market::{FxRate, NewPrice, BTC, GBP, USD};
use crate::domain::timestamp::{daily_buckets, hourly_buckets};
use crate::ports::store_port::StorePort;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub prices: usize,
    pub fx: usize,
}

fn windows(now: NaiveDateTime) -> [(Vec<NaiveDateTime>, Duration); 2] {
    [
        (hourly_buckets(now, 24), Duration::hours(1)),
        (daily_buckets(now, 365), Duration::days(1)),
    ]
}

/// For every empty hourly bucket of the last 24 hours and every empty daily
/// bucket of the last year, inserts the last earlier value at the bucket
/// start. Buckets with no earlier value stay empty.
pub fn carry_forward(
    store: &dyn StorePort,
    now: NaiveDateTime,
) -> Result<RepairReport, BalancerError> {
    let mut report = RepairReport::default();

    for asset_id in store.active_asset_ids()? {
        for (buckets, width) in windows(now) {
            for start in buckets {
                if store.has_price_between(asset_id, USD, start, start + width)? {
                    continue;
                }
                if let Some(prev) = store.price_at_or_before(asset_id, USD, start)? {
                    report.prices += store.insert_prices(&[NewPrice {
                        asset_id,
                        ccy: USD.into(),
                        price: prev.price,
                        at: start,
                    }])?;
                }
            }
        }
    }

    for base in [GBP, BTC] {
        for (buckets, width) in windows(now) {
            for start in buckets {
                if store.has_fx_between(base, USD, start, start + width)? {
                    continue;
                }
                if let Some(rate) = store.fx_before(base, USD, start)? {
                    report.fx += store.insert_fx_rates(&[FxRate {
                        base_ccy: base.into(),
                        quote_ccy: USD.into(),
                        rate,
                        at: start,
                    }])?;
                }
            }
        }
    }

    log::info!("carry-forward inserted {} prices and {} fx rates", report.prices, report.fx);
    Ok(report)
}
