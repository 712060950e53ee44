#![allow(dead_code)]

use balancer::adapters::sqlite_adapter::SqliteAdapter;
use balancer::domain::alert::AlertEntry;
use balancer::domain::asset::AssetUpsert;
use balancer::domain::error::BalancerError;
use balancer::domain::market::{FxRate, MarketRow, NewPrice, SearchCoin, GBP, USD};
use balancer::domain::portfolio::PositionUpsert;
use balancer::domain::timestamp;
use balancer::ports::alert_port::AlertPort;
use balancer::ports::cache_port::CachePort;
use balancer::ports::market_port::{ChartSeries, MacroDataPort, MarketDataPort};
use balancer::ports::store_port::StorePort;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Market data served from fixed tables. Every call fails when `fail_all` is set.
#[derive(Default)]
pub struct MockMarket {
    pub usd: HashMap<String, f64>,
    pub gbp: HashMap<String, f64>,
    pub images: HashMap<String, String>,
    pub caps: HashMap<String, f64>,
    pub dominance: Option<f64>,
    pub search_hits: Vec<SearchCoin>,
    pub fail_all: bool,
}

impl MockMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, id: &str, usd: f64, gbp: f64) -> Self {
        self.usd.insert(id.to_string(), usd);
        self.gbp.insert(id.to_string(), gbp);
        self
    }

    pub fn with_icon(mut self, id: &str, image: &str, cap: f64) -> Self {
        self.images.insert(id.to_string(), image.to_string());
        self.caps.insert(id.to_string(), cap);
        self
    }

    pub fn with_dominance(mut self, value: f64) -> Self {
        self.dominance = Some(value);
        self
    }

    pub fn with_search(mut self, hits: Vec<SearchCoin>) -> Self {
        self.search_hits = hits;
        self
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), BalancerError> {
        if self.fail_all {
            return Err(BalancerError::HttpStatus {
                url: "mock".into(),
                status: 503,
            });
        }
        Ok(())
    }
}

impl MarketDataPort for MockMarket {
    fn markets(&self, ids: &[String], vs_currency: &str) -> Result<Vec<MarketRow>, BalancerError> {
        self.check()?;
        let table = if vs_currency.eq_ignore_ascii_case("gbp") {
            &self.gbp
        } else {
            &self.usd
        };
        Ok(ids
            .iter()
            .filter_map(|id| {
                table.get(id).map(|&price| MarketRow {
                    id: id.clone(),
                    symbol: id.chars().take(3).collect::<String>(),
                    name: id.clone(),
                    current_price: Some(price),
                    image: self.images.get(id).cloned(),
                    market_cap: self.caps.get(id).copied(),
                })
            })
            .collect())
    }

    fn btc_dominance(&self) -> Result<Option<f64>, BalancerError> {
        self.check()?;
        Ok(self.dominance)
    }

    fn search(&self, _query: &str) -> Result<Vec<SearchCoin>, BalancerError> {
        self.check()?;
        Ok(self.search_hits.clone())
    }

    fn market_chart(
        &self,
        _id: &str,
        _vs: &str,
        _days: &str,
    ) -> Result<ChartSeries, BalancerError> {
        self.check()?;
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct MockMacro {
    pub dxy: Option<f64>,
    pub fear_greed: Option<f64>,
}

impl MacroDataPort for MockMacro {
    fn fred_latest(&self, _series_id: &str) -> Result<Option<f64>, BalancerError> {
        Ok(self.dxy)
    }

    fn fear_greed_latest(&self) -> Result<Option<f64>, BalancerError> {
        Ok(self.fear_greed)
    }
}

/// Alert log kept in memory.
#[derive(Default)]
pub struct MemoryAlerts {
    pub entries: Mutex<Vec<AlertEntry>>,
}

impl AlertPort for MemoryAlerts {
    fn append(&self, entry: &AlertEntry) -> Result<(), BalancerError> {
        self.entries
            .lock()
            .map_err(|e| BalancerError::invalid(e.to_string()))?
            .push(entry.clone());
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<serde_json::Value>, BalancerError> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| BalancerError::invalid(e.to_string()))?;
        let start = entries.len().saturating_sub(limit);
        entries[start..]
            .iter()
            .map(|e| serde_json::to_value(e).map_err(|e| BalancerError::invalid(e.to_string())))
            .collect()
    }
}

/// Cache kept in memory; every entry reports age zero.
#[derive(Default)]
pub struct MemoryCache {
    pub entries: Mutex<HashMap<String, String>>,
}

impl CachePort for MemoryCache {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn age(&self, key: &str) -> Option<Duration> {
        self.entries
            .lock()
            .ok()?
            .contains_key(key)
            .then_some(Duration::ZERO)
    }

    fn store(&self, key: &str, content: &str) -> Result<(), BalancerError> {
        self.entries
            .lock()
            .map_err(|e| BalancerError::invalid(e.to_string()))?
            .insert(key.to_string(), content.to_string());
        Ok(())
    }
}

pub fn fresh_db() -> SqliteAdapter {
    let db = SqliteAdapter::in_memory().unwrap();
    db.initialize_schema().unwrap();
    db
}

pub fn hours_ago(hours: i64) -> NaiveDateTime {
    timestamp::now() - chrono::Duration::hours(hours)
}

/// Adds `coins` of `symbol` to the default portfolio with a USD price and
/// an average cost in GBP.
pub fn seed_holding(
    store: &dyn StorePort,
    symbol: &str,
    coingecko_id: Option<&str>,
    coins: f64,
    avg_cost_gbp: f64,
    price_usd: f64,
) -> i64 {
    let pf = store.ensure_portfolio("Default", "USD").unwrap();
    let asset = store
        .upsert_asset(
            &AssetUpsert::new(symbol)
                .name(symbol.to_string())
                .coingecko_id(coingecko_id.map(str::to_string)),
        )
        .unwrap();
    store
        .upsert_position(
            pf.id,
            asset.id,
            &PositionUpsert::coins(coins, GBP).with_avg_cost(avg_cost_gbp),
        )
        .unwrap();
    store
        .insert_prices(&[NewPrice {
            asset_id: asset.id,
            ccy: USD.into(),
            price: price_usd,
            at: hours_ago(1),
        }])
        .unwrap();
    asset.id
}

pub fn seed_gbp_usd(store: &dyn StorePort, rate: f64) {
    store
        .insert_fx_rates(&[FxRate {
            base_ccy: GBP.into(),
            quote_ccy: USD.into(),
            rate,
            at: hours_ago(2),
        }])
        .unwrap();
}

/// BTC and ETH held in the default portfolio, GBP/USD at 1.25 recorded an
/// hour before the prices.
pub fn seeded_db() -> SqliteAdapter {
    let db = fresh_db();
    db.with_store(|store| {
        seed_holding(store, "BTC", Some("bitcoin"), 0.5, 20_000.0, 60_000.0);
        seed_holding(store, "ETH", Some("ethereum"), 2.0, 1_000.0, 3_000.0);
        seed_gbp_usd(store, 1.25);
        Ok(())
    })
    .unwrap();
    db
}
