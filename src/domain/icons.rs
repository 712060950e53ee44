//! Icon URLs and market caps for held coins, behind a weekly cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::BalancerError;
use crate::ports::cache_port::CachePort;
use crate::ports::market_port::MarketDataPort;
use crate::ports::store_port::StorePort;

pub const ICONS_CACHE_KEY: &str = "icons.json";
pub const ICONS_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Icons {
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    #[serde(default)]
    pub caps: BTreeMap<String, f64>,
}

/// On-disk cache document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IconCache {
    #[serde(rename = "updatedAt")]
    pub updated_at: i64,
    #[serde(flatten)]
    pub icons: Icons,
}

impl IconCache {
    /// Younger than a week and carrying market caps.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        now_ms - self.updated_at < ICONS_TTL_MS && !self.icons.caps.is_empty()
    }
}

fn load_cache(cache: &dyn CachePort) -> Option<IconCache> {
    let raw = cache.load(ICONS_CACHE_KEY)?;
    match serde_json::from_str(&raw) {
        Ok(doc) => Some(doc),
        Err(e) => {
            log::warn!("ignoring unreadable {ICONS_CACHE_KEY}: {e}");
            None
        }
    }
}

/// Serves a fresh cache, otherwise refetches for the held Coingecko ids.
/// A failed fetch falls back to the stale cache, then to empty maps.
pub fn get_icons(
    store: &dyn StorePort,
    market: &dyn MarketDataPort,
    cache: &dyn CachePort,
    portfolio: Option<&str>,
    now_ms: i64,
) -> Result<Icons, BalancerError> {
    let cached = load_cache(cache);
    if let Some(doc) = cached.as_ref().filter(|d| d.is_fresh(now_ms)) {
        return Ok(doc.icons.clone());
    }

    let ids = store.held_coingecko_ids(portfolio)?;
    if ids.is_empty() {
        return Ok(Icons::default());
    }

    let rows = match market.markets(&ids, "usd") {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!("icon refresh failed: {e}");
            return Ok(cached.map(|d| d.icons).unwrap_or_default());
        }
    };

    let mut icons = Icons::default();
    for row in rows.into_iter().filter(|r| !r.id.is_empty()) {
        if let Some(image) = row.image.filter(|i| !i.is_empty()) {
            icons.images.insert(row.id.clone(), image);
        }
        if let Some(cap) = row.market_cap.filter(|c| c.is_finite()) {
            icons.caps.insert(row.id, cap);
        }
    }

    let doc = IconCache {
        updated_at: now_ms,
        icons,
    };
    match serde_json::to_string(&doc) {
        Ok(raw) => {
            if let Err(e) = cache.store(ICONS_CACHE_KEY, &raw) {
                log::warn!("failed to write {ICONS_CACHE_KEY}: {e}");
            }
        }
        Err(e) => log::warn!("failed to encode {ICONS_CACHE_KEY}: {e}"),
    }
    Ok(doc.icons)
}
