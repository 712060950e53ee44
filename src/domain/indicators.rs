//! Market indicators: BTC dominance, trade-weighted dollar index and the
//! Fear & Greed index.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::domain::error::BalancerError;
use crate::domain::market::{
    IndicatorObservation, INDICATOR_BTC_DOMINANCE, INDICATOR_DXY, INDICATOR_FEAR_GREED,
    KNOWN_INDICATORS,
};
use crate::domain::timestamp;
use crate::ports::market_port::{MacroDataPort, MarketDataPort};
use crate::ports::store_port::StorePort;

/// Window shown by the indicators view.
pub const VIEW_WINDOW_DAYS: i64 = 30;

fn usable(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v != 0.0)
}

/// Fetches all indicators and stores the available ones at `now`.
///
/// A failing upstream is logged and skipped; only store errors propagate.
/// Returns what was stored.
pub fn fetch_and_store(
    store: &dyn StorePort,
    market: &dyn MarketDataPort,
    macro_data: &dyn MacroDataPort,
    dxy_series: &str,
    now: NaiveDateTime,
) -> Result<Vec<IndicatorObservation>, BalancerError> {
    let fetched = [
        (INDICATOR_BTC_DOMINANCE, market.btc_dominance()),
        (INDICATOR_DXY, macro_data.fred_latest(dxy_series)),
        (INDICATOR_FEAR_GREED, macro_data.fear_greed_latest()),
    ];

    let mut stored = Vec::new();
    for (name, result) in fetched {
        let value = match result {
            Ok(value) => usable(value),
            Err(e) => {
                log::warn!("indicator {name} unavailable: {e}");
                None
            }
        };
        let Some(value) = value else {
            log::debug!("indicator {name} has no value, skipping");
            continue;
        };
        let observation = IndicatorObservation {
            name: name.to_string(),
            value,
            at: now,
        };
        store.insert_indicator(&observation)?;
        stored.push(observation);
    }
    Ok(stored)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestIndicator {
    pub value: f64,
    pub at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub t: String,
    pub v: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorsView {
    pub indicators: BTreeMap<String, LatestIndicator>,
    pub series: BTreeMap<String, Vec<SeriesPoint>>,
}

/// Latest value per indicator and the series of the known indicators over
/// the last thirty days. Known series are always present, possibly empty.
pub fn indicators_view(
    store: &dyn StorePort,
    now: NaiveDateTime,
) -> Result<IndicatorsView, BalancerError> {
    let rows = store.indicators_since(now - Duration::days(VIEW_WINDOW_DAYS))?;

    let mut view = IndicatorsView::default();
    for name in KNOWN_INDICATORS {
        view.series.insert(name.to_string(), Vec::new());
    }
    // rows are oldest first, so later inserts win
    for row in rows {
        let at = timestamp::to_iso(row.at);
        if let Some(series) = view.series.get_mut(&row.name) {
            series.push(SeriesPoint {
                t: at.clone(),
                v: row.value,
            });
        }
        view.indicators.insert(row.name, LatestIndicator { value: row.value, at });
    }
    Ok(view)
}
