//! Position edits and bulk holdings import.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::asset::AssetUpsert;
use crate::domain::error::BalancerError;
use crate::domain::importer::to_number;
use crate::domain::portfolio::{Position, PositionUpsert};
use crate::ports::store_port::StorePort;

/// Partial update of one existing position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionUpdate {
    pub symbol: String,
    pub coins: Option<f64>,
    pub avg_cost_per_unit: Option<f64>,
    pub cost_basis_usd: Option<f64>,
    pub portfolio_name: Option<String>,
}

impl PositionUpdate {
    pub fn is_valid(&self) -> bool {
        !self.symbol.trim().is_empty()
            && (self.coins.is_some()
                || self.avg_cost_per_unit.is_some()
                || self.cost_basis_usd.is_some())
    }
}

/// Applies `update`. When a cost basis is given the average cost becomes
/// `cost_basis / coins` using the new coin count if one was given; otherwise
/// an explicit average cost is stored as is.
///
/// Runs its statements on `store` without its own transaction; callers wrap
/// it so a failure leaves the position untouched.
pub fn update_position(
    store: &dyn StorePort,
    update: &PositionUpdate,
    default_portfolio: &str,
) -> Result<Position, BalancerError> {
    if !update.is_valid() {
        return Err(BalancerError::invalid("invalid_payload"));
    }
    let portfolio = update
        .portfolio_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(default_portfolio);

    let pf = store
        .find_portfolio(portfolio)?
        .ok_or_else(|| BalancerError::not_found("portfolio"))?;
    let asset = store
        .find_asset_by_symbol(update.symbol.trim())?
        .ok_or_else(|| BalancerError::not_found("asset"))?;
    let mut position = store
        .find_position(pf.id, asset.id)?
        .ok_or_else(|| BalancerError::not_found("position"))?;

    if let Some(coins) = update.coins {
        store.set_position_coins(position.id, coins)?;
        position.coins = coins;
    }
    if let Some(cb) = update.cost_basis_usd {
        if position.coins <= 0.0 {
            return Err(BalancerError::invalid("invalid_coins_for_cost_basis"));
        }
        let avg = cb / position.coins;
        store.set_position_avg_cost(position.id, avg)?;
        position.avg_cost_per_unit = avg;
    } else if let Some(avg) = update.avg_cost_per_unit {
        store.set_position_avg_cost(position.id, avg)?;
        position.avg_cost_per_unit = avg;
    }
    log::info!(
        "updated {} in {portfolio}: coins={} avg={}",
        asset.symbol,
        position.coins,
        position.avg_cost_per_unit
    );
    Ok(position)
}

/// Accepts a JSON number, a numeric string in any locale style, or null.
/// Anything else reads as zero.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => to_number(&s).unwrap_or(0.0),
        _ => 0.0,
    })
}

/// Reads a string, number or `true` as text. Null, `false`, zero, empty
/// strings and containers read as absent.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => {
            Some(n.to_string())
        }
        serde_json::Value::Bool(true) => Some("true".to_string()),
        _ => None,
    })
}

/// Truthiness of any JSON value: null, `false`, zero and the empty string
/// are false, everything else is true.
fn lenient_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(b),
        serde_json::Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        serde_json::Value::String(s) => Some(!s.is_empty()),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Some(true),
    })
}

/// One entry of a holdings import document. Every field is read leniently so
/// one oddly typed entry never rejects the whole document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportAsset {
    #[serde(default, deserialize_with = "lenient_text")]
    pub symbol: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub coingecko_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub coins: f64,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_stable: Option<bool>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_fiat: Option<bool>,
}

impl ImportAsset {
    /// Reads each element of an import array; elements that are not objects
    /// become empty entries and are skipped on import.
    pub fn parse_all(entries: &[serde_json::Value]) -> Vec<ImportAsset> {
        entries
            .iter()
            .map(|entry| ImportAsset::deserialize(entry).unwrap_or_default())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub assets: usize,
    pub skipped: usize,
}

/// Upserts each asset and sets its coin count in `portfolio`, creating the
/// portfolio if needed. Names and Coingecko ids only overwrite when given;
/// stable/fiat flags apply to new assets only. New positions start with a
/// zero average cost in `avg_cost_ccy`.
pub fn import_assets(
    store: &dyn StorePort,
    portfolio: &str,
    assets: &[ImportAsset],
    avg_cost_ccy: &str,
) -> Result<ImportSummary, BalancerError> {
    let pf = store.ensure_portfolio(portfolio, "USD")?;
    let mut summary = ImportSummary::default();

    for entry in assets {
        let symbol = entry.symbol.as_deref().unwrap_or_default().trim().to_uppercase();
        if symbol.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let mut upsert = AssetUpsert::new(&symbol)
            .name(entry.name.clone().unwrap_or_default())
            .coingecko_id(entry.coingecko_id.clone());
        if store.find_asset_by_symbol(&symbol)?.is_none() {
            upsert = upsert.flags(
                entry.is_stable.unwrap_or(false),
                entry.is_fiat.unwrap_or(false),
            );
        }
        let asset = store.upsert_asset(&upsert)?;
        store.upsert_position(
            pf.id,
            asset.id,
            &PositionUpsert::coins(entry.coins, avg_cost_ccy),
        )?;
        summary.assets += 1;
    }
    log::info!(
        "imported {} assets into {portfolio} ({} skipped)",
        summary.assets,
        summary.skipped
    );
    Ok(summary)
}
