//! Price, FX and indicator observations.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const USD: &str = "USD";
pub const GBP: &str = "GBP";
pub const BTC: &str = "BTC";

pub const INDICATOR_BTC_DOMINANCE: &str = "BTCD";
pub const INDICATOR_DXY: &str = "DXY_TWEX";
pub const INDICATOR_FEAR_GREED: &str = "FEAR_GREED";
pub const KNOWN_INDICATORS: [&str; 3] =
    [INDICATOR_BTC_DOMINANCE, INDICATOR_DXY, INDICATOR_FEAR_GREED];

/// A stored price of one asset in one currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub price: f64,
    pub at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPrice {
    pub asset_id: i64,
    pub ccy: String,
    pub price: f64,
    pub at: NaiveDateTime,
}

/// `rate` quote units per one base unit, e.g. GBP→USD 1.27.
#[derive(Debug, Clone, PartialEq)]
pub struct FxRate {
    pub base_ccy: String,
    pub quote_ccy: String,
    pub rate: f64,
    pub at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorObservation {
    pub name: String,
    pub value: f64,
    pub at: NaiveDateTime,
}

/// One row of the Coingecko `coins/markets` response. Unknown fields are
/// ignored and missing numbers stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketRow {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub current_price: Option<f64>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub market_cap: Option<f64>,
}

/// A coin returned by the Coingecko `/search` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCoin {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub api_symbol: Option<String>,
    #[serde(default)]
    pub market_cap_rank: Option<i64>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Percentage change from `reference` to `latest`.
///
/// `None` when the reference is missing, non-positive or non-finite, or when
/// `latest` is non-finite.
pub fn pct_change(latest: f64, reference: Option<f64>) -> Option<f64> {
    let reference = reference?;
    if !reference.is_finite() || reference <= 0.0 || !latest.is_finite() {
        return None;
    }
    Some((latest - reference) / reference * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pct_change_basic() {
        assert_relative_eq!(pct_change(110.0, Some(100.0)).unwrap(), 10.0);
        assert_relative_eq!(pct_change(50.0, Some(100.0)).unwrap(), -50.0);
    }

    #[test]
    fn pct_change_rejects_bad_reference() {
        assert_eq!(pct_change(10.0, None), None);
        assert_eq!(pct_change(10.0, Some(0.0)), None);
        assert_eq!(pct_change(10.0, Some(-3.0)), None);
        assert_eq!(pct_change(10.0, Some(f64::INFINITY)), None);
        assert_eq!(pct_change(f64::NAN, Some(1.0)), None);
    }

    #[test]
    fn market_row_tolerates_missing_fields() {
        let rows: Vec<MarketRow> = serde_json::from_str(
            r#"[
                {"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "current_price": 60000,
                 "market_cap": 1.2e12, "extra": true},
                {"id": "weird", "current_price": null}
            ]"#,
        )
        .unwrap();
        assert_eq!(rows[0].current_price, Some(60000.0));
        assert_eq!(rows[1].symbol, "");
        assert_eq!(rows[1].current_price, None);
    }
}
