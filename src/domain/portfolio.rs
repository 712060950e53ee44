//! Portfolios, positions and rebalance targets.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::domain::asset::Asset;

pub const DEFAULT_PORTFOLIO: &str = "Default";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    pub base_currency: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub id: i64,
    pub portfolio_id: i64,
    pub asset_id: i64,
    pub coins: f64,
    pub avg_cost_ccy: String,
    pub avg_cost_per_unit: f64,
    pub as_of: Option<NaiveDateTime>,
}

impl Position {
    /// Cost basis in the position's own average-cost currency.
    pub fn cost_basis(&self) -> f64 {
        self.avg_cost_per_unit * self.coins
    }

    pub fn is_open(&self) -> bool {
        self.coins > 0.0
    }
}

/// A position joined with its asset.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub asset: Asset,
    pub position: Position,
}

/// Insert/update request for a position.
///
/// New rows take `default_ccy` and a zero average cost unless given; updates
/// always set coins and only touch the average cost fields that are present.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpsert {
    pub coins: f64,
    pub avg_cost_ccy: Option<String>,
    pub avg_cost_per_unit: Option<f64>,
    pub default_ccy: String,
}

impl PositionUpsert {
    pub fn coins(coins: f64, default_ccy: &str) -> Self {
        Self {
            coins,
            avg_cost_ccy: None,
            avg_cost_per_unit: None,
            default_ccy: default_ccy.to_uppercase(),
        }
    }

    pub fn with_avg_cost(mut self, per_unit: f64) -> Self {
        self.avg_cost_per_unit = Some(per_unit);
        self
    }

    pub fn with_avg_cost_ccy(mut self, ccy: &str) -> Self {
        self.avg_cost_ccy = Some(ccy.to_uppercase());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub portfolio_id: i64,
    pub asset_id: i64,
    pub target_weight: f64,
    pub min_trade_usd: f64,
    pub drift_band: f64,
}

impl Target {
    pub const DEFAULT_MIN_TRADE_USD: f64 = 50.0;
    pub const DEFAULT_DRIFT_BAND: f64 = 0.2;

    /// Band applied to drift, falling back to the default for unset rows.
    pub fn effective_band(&self) -> f64 {
        if self.drift_band > 0.0 {
            self.drift_band
        } else {
            Self::DEFAULT_DRIFT_BAND
        }
    }

    pub fn effective_min_trade(&self) -> f64 {
        if self.min_trade_usd > 0.0 {
            self.min_trade_usd
        } else {
            Self::DEFAULT_MIN_TRADE_USD
        }
    }
}
