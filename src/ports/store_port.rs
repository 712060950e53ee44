//! Persistence port trait for portfolios, prices and observations.

use chrono::NaiveDateTime;

use crate::domain::asset::{Asset, AssetUpsert};
use crate::domain::error::BalancerError;
use crate::domain::market::{FxRate, IndicatorObservation, NewPrice, PricePoint};
use crate::domain::portfolio::{Holding, Portfolio, Position, PositionUpsert, Target};

/// A recorded alert row, used for cool-off checks.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    pub portfolio_id: i64,
    pub asset_id: i64,
    pub kind: String,
    pub message: String,
    pub payload_json: Option<String>,
    pub severity: String,
    pub at: NaiveDateTime,
}

/// Time bucket granularity for coverage counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Hour,
    Day,
}

impl Bucket {
    pub fn strftime(self) -> &'static str {
        match self {
            Bucket::Hour => "%Y-%m-%d %H",
            Bucket::Day => "%Y-%m-%d",
        }
    }
}

pub trait StorePort {
    // Portfolios
    fn find_portfolio(&self, name: &str) -> Result<Option<Portfolio>, BalancerError>;
    fn ensure_portfolio(&self, name: &str, base_currency: &str)
    -> Result<Portfolio, BalancerError>;

    // Assets
    fn find_asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>, BalancerError>;
    fn find_asset_by_coingecko_id(&self, id: &str) -> Result<Option<Asset>, BalancerError>;
    fn upsert_asset(&self, asset: &AssetUpsert) -> Result<Asset, BalancerError>;
    fn set_coingecko_id(&self, asset_id: i64, coingecko_id: &str) -> Result<(), BalancerError>;
    fn active_asset_ids(&self) -> Result<Vec<i64>, BalancerError>;

    // Positions
    /// Active assets joined with their positions. `None` spans all portfolios.
    fn holdings(&self, portfolio: Option<&str>) -> Result<Vec<Holding>, BalancerError>;
    fn find_position(
        &self,
        portfolio_id: i64,
        asset_id: i64,
    ) -> Result<Option<Position>, BalancerError>;
    fn upsert_position(
        &self,
        portfolio_id: i64,
        asset_id: i64,
        values: &PositionUpsert,
    ) -> Result<Position, BalancerError>;
    fn set_position_coins(&self, position_id: i64, coins: f64) -> Result<(), BalancerError>;
    fn set_position_avg_cost(&self, position_id: i64, avg: f64) -> Result<(), BalancerError>;
    /// Coingecko ids of held assets, de-duplicated.
    fn held_coingecko_ids(&self, portfolio: Option<&str>) -> Result<Vec<String>, BalancerError>;
    /// Active held assets with no Coingecko id.
    fn unmapped_held_assets(&self, limit: usize) -> Result<Vec<Asset>, BalancerError>;

    // Prices
    fn insert_prices(&self, prices: &[NewPrice]) -> Result<usize, BalancerError>;
    fn latest_price(&self, asset_id: i64, ccy: &str) -> Result<Option<PricePoint>, BalancerError>;
    fn price_at_or_before(
        &self,
        asset_id: i64,
        ccy: &str,
        at: NaiveDateTime,
    ) -> Result<Option<PricePoint>, BalancerError>;
    fn earliest_price(&self, asset_id: i64, ccy: &str)
    -> Result<Option<PricePoint>, BalancerError>;
    fn has_price_between(
        &self,
        asset_id: i64,
        ccy: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<bool, BalancerError>;
    /// Timestamp of the newest price row of any asset.
    fn latest_price_time(&self) -> Result<Option<NaiveDateTime>, BalancerError>;

    // FX
    fn insert_fx_rates(&self, rates: &[FxRate]) -> Result<usize, BalancerError>;
    fn latest_fx(&self, base: &str, quote: &str) -> Result<Option<f64>, BalancerError>;
    fn fx_at_or_before(
        &self,
        base: &str,
        quote: &str,
        at: NaiveDateTime,
    ) -> Result<Option<f64>, BalancerError>;
    fn fx_before(
        &self,
        base: &str,
        quote: &str,
        at: NaiveDateTime,
    ) -> Result<Option<f64>, BalancerError>;
    fn has_fx_between(
        &self,
        base: &str,
        quote: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<bool, BalancerError>;

    // Indicators
    fn insert_indicator(&self, observation: &IndicatorObservation) -> Result<(), BalancerError>;
    /// Observations at or after `since`, oldest first.
    fn indicators_since(
        &self,
        since: NaiveDateTime,
    ) -> Result<Vec<IndicatorObservation>, BalancerError>;

    // Targets and alerts
    fn targets(&self, portfolio_id: i64) -> Result<Vec<Target>, BalancerError>;
    fn upsert_target(&self, target: &Target) -> Result<(), BalancerError>;
    fn insert_alert(&self, alert: &AlertRecord) -> Result<(), BalancerError>;
    fn alert_exists_since(
        &self,
        portfolio_id: i64,
        asset_id: i64,
        kind: &str,
        since: NaiveDateTime,
    ) -> Result<bool, BalancerError>;

    // Coverage
    fn count_price_buckets(
        &self,
        asset_id: i64,
        ccy: &str,
        since: NaiveDateTime,
        bucket: Bucket,
    ) -> Result<usize, BalancerError>;
    fn count_fx_buckets(
        &self,
        base: &str,
        quote: &str,
        since: NaiveDateTime,
        bucket: Bucket,
    ) -> Result<usize, BalancerError>;
}
