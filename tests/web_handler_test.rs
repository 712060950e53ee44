#![cfg(feature = "web")]
//! Web handler integration tests.
//!
//! Tests cover:
//! - Read routes return their payloads, and empty payloads with 200 on failure
//! - Position updates validate input and report domain errors in the body
//! - Admin import, export and resolve
//! - Dev-only database dump gating
//! - Unknown routes

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use balancer::adapters::file_config_adapter::FileConfigAdapter;
use balancer::adapters::sqlite_adapter::SqliteAdapter;
use balancer::adapters::web::{build_router, AppState, INVALID_IMPORT};
use balancer::domain::alert::AlertEntry;
use balancer::domain::market::SearchCoin;
use balancer::domain::settings::Settings;
use balancer::ports::alert_port::AlertPort;
use balancer::ports::store_port::StorePort;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use common::*;

fn settings(dev_mode: bool) -> Settings {
    let ini = format!("[database]\npath = :memory:\n[server]\ndev_mode = {dev_mode}\n");
    let config = FileConfigAdapter::from_string(&ini).unwrap();
    Settings::from_config(&config).unwrap()
}

fn app_with(
    db: SqliteAdapter,
    market: MockMarket,
    alerts: Arc<MemoryAlerts>,
    dev_mode: bool,
) -> Router {
    build_router(AppState {
        db,
        market: Arc::new(market),
        alerts,
        cache: Arc::new(MemoryCache::default()),
        settings: settings(dev_mode),
    })
}

fn seeded_app() -> Router {
    app_with(
        seeded_db(),
        MockMarket::new(),
        Arc::new(MemoryAlerts::default()),
        false,
    )
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    read(response).await
}

async fn post_json(app: Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    read(response).await
}

async fn read(response: axum::response::Response) -> (StatusCode, Value) {
    use http_body_util::BodyExt;
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

mod read_routes {
    use super::*;

    #[tokio::test]
    async fn portfolio_values_holdings() {
        let (status, body) = get_json(seeded_app(), "/api/portfolio").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assets"].as_array().unwrap().len(), 2);
        assert_eq!(body["total_mv_usd"].as_f64().unwrap(), 36_000.0);
        assert!(body["as_of"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn portfolio_on_empty_database() {
        let app = app_with(fresh_db(), MockMarket::new(), Arc::default(), false);
        let (status, body) = get_json(app, "/api/portfolio").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["as_of"].is_null());
        assert_eq!(body["assets"], json!([]));
    }

    #[tokio::test]
    async fn summary_has_all_fields() {
        let (status, body) = get_json(seeded_app(), "/api/portfolio/summary").await;
        assert_eq!(status, StatusCode::OK);
        for key in [
            "total_gbp",
            "cost_basis_gbp",
            "net_gbp",
            "delta_1d_gbp",
            "delta_1m_gbp",
            "pct_1d_gbp",
            "pct_1m_gbp",
        ] {
            assert!(body[key].is_number(), "missing {key}");
        }
    }

    #[tokio::test]
    async fn indicators_empty_without_observations() {
        let (status, body) = get_json(seeded_app(), "/api/indicators").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["indicators"], json!({}));
        assert_eq!(body["series"], json!({}));
    }

    #[tokio::test]
    async fn alerts_lists_recent_entries() {
        let alerts = Arc::new(MemoryAlerts::default());
        let app = app_with(fresh_db(), MockMarket::new(), alerts.clone(), false);
        alerts
            .append(&AlertEntry::info(
                "take_profit",
                "BTC: Value >= 2.0x cost".into(),
                json!({"multiple": 2.0}),
            ))
            .unwrap();

        let (status, body) = get_json(app, "/api/alerts").await;
        assert_eq!(status, StatusCode::OK);
        let list = body["alerts"].as_array().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["type"], "take_profit");
    }

    #[tokio::test]
    async fn alerts_empty_log() {
        let (_, body) = get_json(seeded_app(), "/api/alerts").await;
        assert_eq!(body, json!({ "alerts": [] }));
    }

    #[tokio::test]
    async fn icons_from_market() {
        let market = MockMarket::new()
            .with_price("bitcoin", 60_000.0, 48_000.0)
            .with_icon("bitcoin", "https://img/btc.png", 1.2e12);
        let app = app_with(seeded_db(), market, Arc::default(), false);
        let (status, body) = get_json(app, "/api/icons").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["images"]["bitcoin"], "https://img/btc.png");
        assert_eq!(body["caps"]["bitcoin"].as_f64().unwrap(), 1.2e12);
    }

    #[tokio::test]
    async fn icons_survive_upstream_failure() {
        let app = app_with(seeded_db(), MockMarket::failing(), Arc::default(), false);
        let (status, body) = get_json(app, "/api/icons").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "images": {}, "caps": {} }));
    }

    #[tokio::test]
    async fn changes_default_to_usd() {
        let (status, body) = get_json(seeded_app(), "/api/changes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["ccy"], "USD");
        assert_eq!(body["changes"]["BTC"]["latest"].as_f64().unwrap(), 60_000.0);
    }

    #[tokio::test]
    async fn changes_in_gbp() {
        let (_, body) = get_json(seeded_app(), "/api/changes?ccy=gbp").await;
        assert_eq!(body["ccy"], "GBP");
        assert_eq!(body["changes"]["BTC"]["latest"].as_f64().unwrap(), 48_000.0);
    }

    #[tokio::test]
    async fn changes_unknown_currency_falls_back_to_usd() {
        let (status, body) = get_json(seeded_app(), "/api/changes?ccy=zzz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ccy"], "USD");
        assert_eq!(body["changes"]["BTC"]["latest"].as_f64().unwrap(), 60_000.0);
    }

    #[tokio::test]
    async fn health_reports_coverage() {
        let (status, body) = get_json(seeded_app(), "/api/data/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["ok"].is_boolean());
        assert_eq!(body["assets_total"], 2);
    }
}

mod position_updates {
    use super::*;

    #[tokio::test]
    async fn rejects_payload_without_fields() {
        let (status, body) =
            post_json(seeded_app(), "/api/positions/update", r#"{"symbol": "BTC"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_payload");
    }

    #[tokio::test]
    async fn rejects_non_json_body() {
        let (status, _) = post_json(seeded_app(), "/api/positions/update", "coins=1").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn string_numbers_are_ignored() {
        let (status, _) = post_json(
            seeded_app(),
            "/api/positions/update",
            r#"{"symbol": "BTC", "coins": "1.5"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn updates_coins() {
        let db = seeded_db();
        let app = app_with(db.clone(), MockMarket::new(), Arc::default(), false);
        let (status, body) = post_json(
            app,
            "/api/positions/update",
            r#"{"symbol": "btc", "coins": 1.5}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let coins = db
            .with_store(|s| {
                let holdings = s.holdings(Some("Default"))?;
                Ok(holdings
                    .into_iter()
                    .find(|h| h.asset.symbol == "BTC")
                    .map(|h| h.position.coins))
            })
            .unwrap();
        assert_eq!(coins, Some(1.5));
    }

    #[tokio::test]
    async fn unknown_asset_reported_in_body() {
        let (status, body) = post_json(
            seeded_app(),
            "/api/positions/update",
            r#"{"symbol": "DOGE", "coins": 10}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": false, "error": "asset_not_found" }));
    }

    #[tokio::test]
    async fn cost_basis_needs_coins() {
        let db = seeded_db();
        let app = app_with(db.clone(), MockMarket::new(), Arc::default(), false);
        let (_, body) = post_json(
            app,
            "/api/positions/update",
            r#"{"symbol": "ETH", "coins": 0, "cost_basis_usd": 500}"#,
        )
        .await;
        assert_eq!(body["error"], "invalid_coins_for_cost_basis");

        let coins = db
            .with_store(|s| {
                Ok(s.holdings(None)?
                    .into_iter()
                    .find(|h| h.asset.symbol == "ETH")
                    .map(|h| h.position.coins))
            })
            .unwrap();
        assert_eq!(coins, Some(2.0));
    }
}

mod admin {
    use super::*;

    #[tokio::test]
    async fn import_requires_assets_array() {
        let (status, body) =
            post_json(seeded_app(), "/api/admin/portfolio/import", r#"{"assets": 3}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], INVALID_IMPORT);
    }

    #[tokio::test]
    async fn import_then_export() {
        let db = fresh_db();
        let app = app_with(db.clone(), MockMarket::new(), Arc::default(), false);
        let (status, body) = post_json(
            app.clone(),
            "/api/admin/portfolio/import",
            r#"{"assets": [
                {"symbol": "sol", "name": "Solana", "coingecko_id": "solana", "coins": "12.5"},
                {"symbol": "USDC", "coins": 100}
            ]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        let (status, body) = get_json(app, "/api/admin/portfolio/export").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["portfolio"], "Default");
        let symbols: Vec<&str> = body["assets"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["symbol"].as_str().unwrap())
            .collect();
        assert!(symbols.contains(&"SOL"));
        assert!(symbols.contains(&"USDC"));
    }

    #[tokio::test]
    async fn import_coerces_loosely_typed_entries() {
        let db = fresh_db();
        let app = app_with(db.clone(), MockMarket::new(), Arc::default(), false);
        let (status, body) = post_json(
            app,
            "/api/admin/portfolio/import",
            r#"{"assets": [
                {"symbol": "SOL", "coins": 1},
                {"symbol": "USDC", "coins": 5, "is_stable": 1},
                {"symbol": 123, "coins": 5},
                null
            ]}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));

        db.with_store(|s| {
            assert_eq!(s.holdings(None)?.len(), 3);
            assert!(s.find_asset_by_symbol("USDC")?.unwrap().is_stable);
            assert!(s.find_asset_by_symbol("123")?.is_some());
            Ok(())
        })
        .unwrap();
    }

    #[tokio::test]
    async fn resolve_proposes_candidates() {
        let db = seeded_db();
        db.with_store(|s| {
            seed_holding(s, "PEPE", None, 1_000_000.0, 0.0, 0.00001);
            Ok(())
        })
        .unwrap();
        let market = MockMarket::new().with_search(vec![SearchCoin {
            id: Some("pepe".into()),
            symbol: Some("PEPE".into()),
            name: Some("Pepe".into()),
            api_symbol: Some("pepe".into()),
            market_cap_rank: Some(30),
            score: None,
        }]);
        let app = app_with(db, market, Arc::default(), false);

        let (status, body) = get_json(app, "/api/admin/portfolio/resolve").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);
        assert_eq!(body["proposals"][0]["symbol"], "PEPE");
        assert_eq!(body["proposals"][0]["candidates"][0]["id"], "pepe");
    }

    #[tokio::test]
    async fn dev_db_hidden_outside_dev_mode() {
        let (status, body) = get_json(seeded_app(), "/api/dev/db").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Not available in production");
    }

    #[tokio::test]
    async fn dev_db_dumps_tables() {
        let app = app_with(seeded_db(), MockMarket::new(), Arc::default(), true);
        let (status, body) = get_json(app, "/api/dev/db").await;
        assert_eq!(status, StatusCode::OK);
        let tables: Vec<&str> = body["tables"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.as_str().unwrap())
            .collect();
        assert!(tables.contains(&"assets"));
        assert_eq!(body["data"]["assets"].as_array().unwrap().len(), 2);
    }
}

#[tokio::test]
async fn unknown_route_is_404() {
    let (status, body) = get_json(seeded_app(), "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "ok": false, "error": "not_found" }));
}
