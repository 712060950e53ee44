//! Assets tracked by the dashboard.

use serde::{Deserialize, Serialize};

/// Symbols treated as stablecoins on import.
pub const STABLE_SYMBOLS: [&str; 3] = ["USDC", "USDT", "SUSDE"];

/// Coingecko id of USDC, used to derive GBP/USD when no FX row exists.
pub const USDC_COINGECKO_ID: &str = "usd-coin";
pub const BTC_COINGECKO_ID: &str = "bitcoin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub coingecko_id: Option<String>,
    pub is_stable: bool,
    pub is_fiat: bool,
    pub active: bool,
}

/// Insert/update request for an asset, keyed by upper-cased symbol.
///
/// `None` fields leave the stored value untouched on update.
#[derive(Debug, Clone, Default)]
pub struct AssetUpsert {
    pub symbol: String,
    pub name: Option<String>,
    pub coingecko_id: Option<String>,
    pub is_stable: Option<bool>,
    pub is_fiat: Option<bool>,
}

impl AssetUpsert {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.name = Some(name);
        }
        self
    }

    pub fn coingecko_id(mut self, id: Option<String>) -> Self {
        self.coingecko_id = id.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn flags(mut self, is_stable: bool, is_fiat: bool) -> Self {
        self.is_stable = Some(is_stable);
        self.is_fiat = Some(is_fiat);
        self
    }
}

/// Stable/fiat classification applied by the tokenlist importer.
/// GBP cash is both fiat and stable.
pub fn classify(symbol: &str, token: &str) -> (bool, bool) {
    let symbol = symbol.trim().to_uppercase();
    let is_gbp_cash = symbol == "GBP" || token.trim().eq_ignore_ascii_case("GBP");
    let is_stable = STABLE_SYMBOLS.contains(&symbol.as_str()) || is_gbp_cash;
    (is_stable, is_gbp_cash)
}
