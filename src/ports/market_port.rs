//! Upstream market data port traits.

use crate::domain::error::BalancerError;
use crate::domain::market::{MarketRow, SearchCoin};

/// `(unix millis, value)` pairs from a historical chart.
pub type ChartSeries = Vec<(i64, f64)>;

/// Crypto market data (Coingecko).
pub trait MarketDataPort {
    fn markets(&self, ids: &[String], vs_currency: &str) -> Result<Vec<MarketRow>, BalancerError>;

    /// Bitcoin share of total market cap, in percent.
    fn btc_dominance(&self) -> Result<Option<f64>, BalancerError>;

    fn search(&self, query: &str) -> Result<Vec<SearchCoin>, BalancerError>;

    fn market_chart(
        &self,
        id: &str,
        vs_currency: &str,
        days: &str,
    ) -> Result<ChartSeries, BalancerError>;
}

/// Macro indicators (FRED, alternative.me).
pub trait MacroDataPort {
    /// Latest observation of a FRED series. `None` when not configured or
    /// the series has no numeric observation.
    fn fred_latest(&self, series_id: &str) -> Result<Option<f64>, BalancerError>;

    fn fear_greed_latest(&self) -> Result<Option<f64>, BalancerError>;
}
