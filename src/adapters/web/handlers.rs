//! HTTP request handlers for the JSON API.
//!
//! Read routes never fail: on error they log and return an empty payload
//! with status 200. Only malformed input, dev gating and failed admin
//! writes produce error statuses.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::adapters::sqlite_adapter::DUMP_ROW_LIMIT;
use crate::domain::changes::{cached_changes, report_currency};
use crate::domain::error::BalancerError;
use crate::domain::health::verify_health;
use crate::domain::icons::{get_icons, Icons};
use crate::domain::indicators::{indicators_view, IndicatorsView};
use crate::domain::positions::{import_assets, update_position, ImportAsset, PositionUpdate};
use crate::domain::resolver::{resolve_missing, DEFAULT_LIMIT};
use crate::domain::timestamp;
use crate::domain::valuation::{export_view, portfolio_view, summary, Summary};

use super::{AppState, WebError};

pub const ALERTS_LIMIT: usize = 100;
pub const INVALID_IMPORT: &str = "Invalid payload: expected { assets: [] }";

/// Runs store and upstream work off the async runtime.
async fn blocking<T, F>(state: &Arc<AppState>, f: F) -> Result<T, BalancerError>
where
    T: Send + 'static,
    F: FnOnce(&AppState) -> Result<T, BalancerError> + Send + 'static,
{
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| BalancerError::Io(std::io::Error::other(e)))?
}

/// Serializes `result`, or logs the error and serves `fallback`.
fn or_fallback<T: serde::Serialize>(
    what: &str,
    result: Result<T, BalancerError>,
    fallback: Value,
) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => {
            log::error!("{what} failed: {e}");
            Json(fallback).into_response()
        }
    }
}

pub async fn portfolio(State(state): State<Arc<AppState>>) -> Response {
    let result = blocking(&state, |s| {
        s.db.with_store(|store| portfolio_view(store, Some(&s.settings.portfolio.name)))
    })
    .await;
    or_fallback(
        "portfolio view",
        result,
        json!({ "as_of": null, "assets": [], "total_mv_usd": 0 }),
    )
}

pub async fn portfolio_summary(State(state): State<Arc<AppState>>) -> Json<Summary> {
    let result = blocking(&state, |s| {
        s.db.with_store(|store| summary(store, timestamp::now()))
    })
    .await;
    Json(result.unwrap_or_else(|e| {
        log::error!("summary failed: {e}");
        Summary::default()
    }))
}

pub async fn indicators(State(state): State<Arc<AppState>>) -> Json<IndicatorsView> {
    let result = blocking(&state, |s| {
        s.db.with_store(|store| indicators_view(store, timestamp::now()))
    })
    .await;
    Json(result.unwrap_or_else(|e| {
        log::error!("indicators view failed: {e}");
        IndicatorsView::default()
    }))
}

pub async fn alerts(State(state): State<Arc<AppState>>) -> Json<Value> {
    match blocking(&state, |s| s.alerts.recent(ALERTS_LIMIT)).await {
        Ok(alerts) => Json(json!({ "alerts": alerts })),
        Err(e) => {
            log::error!("reading alerts failed: {e}");
            Json(json!({ "alerts": [], "error": "failed_to_read_alerts" }))
        }
    }
}

pub async fn icons(State(state): State<Arc<AppState>>) -> Json<Icons> {
    let result = blocking(&state, |s| {
        let now_ms = timestamp::millis(timestamp::now());
        s.db.with_store(|store| {
            get_icons(
                store,
                s.market.as_ref(),
                s.cache.as_ref(),
                Some(&s.settings.portfolio.name),
                now_ms,
            )
        })
    })
    .await;
    Json(result.unwrap_or_else(|e| {
        log::error!("icons failed: {e}");
        Icons::default()
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangesQuery {
    pub ccy: Option<String>,
}

pub async fn changes(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ChangesQuery>,
) -> Response {
    let ccy = report_currency(query.ccy.as_deref().unwrap_or_default());
    let result = blocking(&state, move |s| {
        s.db.with_store(|store| {
            cached_changes(
                store,
                s.cache.as_ref(),
                ccy,
                Some(&s.settings.portfolio.name),
            )
        })
    })
    .await;
    or_fallback(
        "changes",
        result,
        json!({ "ok": false, "error": "changes_failed" }),
    )
}

pub async fn export_portfolio(State(state): State<Arc<AppState>>) -> Response {
    let result = blocking(&state, |s| {
        s.db.with_store(|store| export_view(store, &s.settings.portfolio.name))
    })
    .await;
    or_fallback("export", result, json!({ "as_of": null, "assets": [] }))
}

pub async fn import_portfolio(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, WebError> {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let Some(entries) = payload.get("assets").and_then(Value::as_array) else {
        return Err(WebError::bad_request(INVALID_IMPORT));
    };
    let assets = ImportAsset::parse_all(entries);
    let portfolio = payload
        .get("portfolio")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string);

    let result = blocking(&state, move |s| {
        let name = portfolio.unwrap_or_else(|| s.settings.portfolio.name.clone());
        s.db.with_transaction(|store| {
            import_assets(store, &name, &assets, &s.settings.portfolio.avg_cost_ccy)
        })
    })
    .await;
    match result {
        Ok(_) => Ok(Json(json!({ "ok": true }))),
        Err(e) => {
            log::error!("portfolio import failed: {e}");
            Err(WebError::internal(e.to_string()))
        }
    }
}

/// Reads only JSON numbers; anything else counts as absent.
fn number_field(body: &Value, key: &str) -> Option<f64> {
    body.get(key).filter(|v| v.is_number()).and_then(Value::as_f64)
}

pub fn position_update_from_json(body: &Value) -> PositionUpdate {
    PositionUpdate {
        symbol: body
            .get("symbol")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_uppercase(),
        coins: number_field(body, "coins"),
        avg_cost_per_unit: number_field(body, "avg_cost_per_unit"),
        cost_basis_usd: number_field(body, "cost_basis_usd"),
        portfolio_name: body
            .get("portfolio_name")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .map(str::to_string),
    }
}

pub async fn update_position_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, WebError> {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let update = position_update_from_json(&payload);
    if !update.is_valid() {
        return Err(WebError::bad_request("invalid_payload"));
    }
    let result = blocking(&state, move |s| {
        s.db.with_transaction(|store| update_position(store, &update, &s.settings.portfolio.name))
    })
    .await;
    Ok(Json(match result {
        Ok(_) => json!({ "ok": true }),
        Err(e) => {
            log::warn!("position update rejected: {e}");
            json!({ "ok": false, "error": e.code() })
        }
    }))
}

pub async fn resolve_portfolio(State(state): State<Arc<AppState>>) -> Response {
    let result = blocking(&state, |s| {
        s.db.with_store(|store| resolve_missing(store, s.market.as_ref(), DEFAULT_LIMIT))
    })
    .await;
    match result {
        Ok(resolution) => Json(resolution).into_response(),
        Err(e) => {
            log::error!("resolve failed: {e}");
            WebError::internal("resolve_failed").into_response()
        }
    }
}

pub async fn dev_db(State(state): State<Arc<AppState>>) -> Response {
    if !state.settings.server.dev_mode {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Not available in production" })),
        )
            .into_response();
    }
    match blocking(&state, |s| s.db.dump(DUMP_ROW_LIMIT)).await {
        Ok(dump) => Json(dump).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

pub async fn data_health(State(state): State<Arc<AppState>>) -> Response {
    let result = blocking(&state, |s| s.db.with_store(|store| verify_health(store))).await;
    or_fallback("health", result, json!({ "ok": false, "error": "health_failed" }))
}

pub async fn not_found() -> WebError {
    WebError::not_found("not_found")
}
