//! Coingecko REST client implementing [`MarketDataPort`].

use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::adapters::http_client::{join_url, HttpClient};
use crate::domain::error::BalancerError;
use crate::domain::market::{MarketRow, SearchCoin};
use crate::domain::settings::CoingeckoSettings;
use crate::ports::market_port::{ChartSeries, MarketDataPort};

/// Extra attempts after the client's own retries when rate limited.
const RATE_LIMIT_RETRIES: u32 = 3;

pub struct CoingeckoAdapter {
    http: HttpClient,
    settings: CoingeckoSettings,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<SearchCoin>,
}

#[derive(Deserialize)]
struct ChartResponse {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
}

impl CoingeckoAdapter {
    pub fn new(http: HttpClient, settings: CoingeckoSettings) -> Self {
        Self { http, settings }
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.settings.base_url, path)
    }

    fn with_key(&self, mut query: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(key) = &self.settings.api_key {
            query.push(("x_cg_demo_api_key", key.clone()));
        }
        query
    }

    fn markets_chunk(&self, ids: &[String], vs: &str) -> Result<Vec<MarketRow>, BalancerError> {
        let url = self.url("coins/markets");
        let query = self.with_key(vec![
            ("ids", ids.join(",")),
            ("vs_currency", vs.to_lowercase()),
            ("per_page", self.settings.per_page.to_string()),
        ]);
        let mut attempts = 0;
        loop {
            match self.http.get_json::<Option<Vec<MarketRow>>>(&url, &query) {
                Ok(rows) => return Ok(rows.unwrap_or_default()),
                Err(BalancerError::HttpStatus { status: 429, .. })
                    if attempts < RATE_LIMIT_RETRIES =>
                {
                    attempts += 1;
                    log::warn!("coingecko rate limited, waiting (attempt {attempts})");
                    thread::sleep(self.http.backoff() * 3 * attempts / 2);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `data.market_cap_percentage.btc` of the `/global` document.
pub fn parse_dominance(global: &Value) -> Option<f64> {
    global
        .pointer("/data/market_cap_percentage/btc")
        .and_then(Value::as_f64)
}

impl MarketDataPort for CoingeckoAdapter {
    fn markets(&self, ids: &[String], vs_currency: &str) -> Result<Vec<MarketRow>, BalancerError> {
        let mut rows = Vec::new();
        for (i, chunk) in ids.chunks(self.settings.per_page.max(1) as usize).enumerate() {
            if i > 0 && self.settings.throttle_ms > 0 {
                thread::sleep(Duration::from_millis(self.settings.throttle_ms));
            }
            rows.extend(self.markets_chunk(chunk, vs_currency)?);
        }
        Ok(rows)
    }

    fn btc_dominance(&self) -> Result<Option<f64>, BalancerError> {
        let global: Value = self.http.get_json(&self.url("global"), &self.with_key(Vec::new()))?;
        Ok(parse_dominance(&global))
    }

    fn search(&self, query: &str) -> Result<Vec<SearchCoin>, BalancerError> {
        let resp: SearchResponse = self.http.get_json(
            &self.url("search"),
            &self.with_key(vec![("query", query.to_string())]),
        )?;
        Ok(resp.coins)
    }

    fn market_chart(
        &self,
        id: &str,
        vs_currency: &str,
        days: &str,
    ) -> Result<ChartSeries, BalancerError> {
        let resp: ChartResponse = self.http.get_json(
            &self.url(&format!("coins/{id}/market_chart")),
            &self.with_key(vec![
                ("vs_currency", vs_currency.to_lowercase()),
                ("days", days.to_string()),
            ]),
        )?;
        Ok(resp
            .prices
            .into_iter()
            .filter_map(|(ms, price)| price.filter(|p| p.is_finite()).map(|p| (ms as i64, p)))
            .collect())
    }
}
