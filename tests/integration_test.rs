//! End-to-end tests of the ingestion, valuation and alerting pipeline.
//!
//! Tests cover:
//! - Import -> price fetch -> indicators -> rules against one database
//! - Alert cool-off across repeated rule runs
//! - Valuation views and change percentages after a fetch
//! - The JSONL alert log as the rule sink
//! - Environment overrides feeding typed settings

mod common;

use approx::assert_relative_eq;
use balancer::adapters::env_config_adapter::EnvConfigAdapter;
use balancer::adapters::file_config_adapter::FileConfigAdapter;
use balancer::adapters::jsonl_alert_adapter::JsonlAlertAdapter;
use balancer::adapters::sqlite_adapter::SqliteAdapter;
use balancer::domain::changes::compute_changes;
use balancer::domain::health::verify_health;
use balancer::domain::importer::import_portfolio_json;
use balancer::domain::indicators::{fetch_and_store, indicators_view};
use balancer::domain::market::{BTC, GBP, USD};
use balancer::domain::positions::{update_position, PositionUpdate};
use balancer::domain::prices::{ids_to_fetch, run_price_fetch};
use balancer::domain::repair::carry_forward;
use balancer::domain::rules::{run_rules, RuleSettings};
use balancer::domain::settings::Settings;
use balancer::domain::timestamp;
use balancer::domain::valuation::portfolio_view;
use balancer::ports::alert_port::AlertPort;
use balancer::ports::store_port::StorePort;
use tempfile::TempDir;

use common::*;

const HOLDINGS: &str = r#"{"assets": [
    {"symbol": "BTC", "name": "Bitcoin", "coingecko_id": "bitcoin", "coins": 1},
    {"symbol": "USDC", "name": "USD Coin", "coingecko_id": "usd-coin", "coins": 100,
     "is_stable": true}
]}"#;

fn market() -> MockMarket {
    MockMarket::new()
        .with_price("bitcoin", 60_000.0, 48_000.0)
        .with_price("usd-coin", 1.0, 0.8)
        .with_dominance(52.5)
}

fn rule_settings() -> RuleSettings {
    RuleSettings {
        ladder: vec![2.0, 3.0, 5.0],
        cooloff: chrono::Duration::days(1),
    }
}

/// Imports the holdings, sets a BTC cost of £10,000 and runs one price fetch.
fn ingested_db() -> SqliteAdapter {
    let db = fresh_db();
    db.with_transaction(|store| {
        import_portfolio_json(store, HOLDINGS, "Default", GBP)?;
        update_position(
            store,
            &PositionUpdate {
                symbol: "BTC".into(),
                coins: None,
                avg_cost_per_unit: Some(10_000.0),
                cost_basis_usd: None,
                portfolio_name: None,
            },
            "Default",
        )?;
        Ok(())
    })
    .unwrap();

    db.with_store(|store| {
        let ids = ids_to_fetch(store, None)?;
        run_price_fetch(store, &market(), &ids, timestamp::now())
    })
    .unwrap();
    db
}

mod pipeline {
    use super::*;

    #[test]
    fn price_fetch_stores_all_currencies() {
        let db = fresh_db();
        db.with_store(|s| import_portfolio_json(s, HOLDINGS, "Default", GBP))
            .unwrap();

        let report = db
            .with_store(|store| {
                let ids = ids_to_fetch(store, None)?;
                run_price_fetch(store, &market(), &ids, timestamp::now())
            })
            .unwrap();
        assert_eq!(report.ids, 2);
        assert_eq!(report.stored, 4);
        assert_eq!(report.btc_stored, 2);
        assert_relative_eq!(report.gbp_usd.unwrap(), 1.25);

        db.with_store(|store| {
            let btc = store.find_asset_by_coingecko_id("bitcoin")?.unwrap();
            assert_eq!(store.latest_price(btc.id, USD)?.unwrap().price, 60_000.0);
            assert_eq!(store.latest_price(btc.id, GBP)?.unwrap().price, 48_000.0);
            assert_relative_eq!(store.latest_price(btc.id, BTC)?.unwrap().price, 1.0);
            assert_relative_eq!(store.latest_fx(BTC, USD)?.unwrap(), 60_000.0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn indicators_are_stored_and_served() {
        let db = ingested_db();
        let macro_data = MockMacro {
            dxy: Some(121.4),
            fear_greed: None,
        };
        let now = timestamp::now();
        let stored = db
            .with_store(|s| fetch_and_store(s, &market(), &macro_data, "DTWEXBGS", now))
            .unwrap();
        assert_eq!(stored.len(), 2);

        let view = db
            .with_store(|s| indicators_view(s, timestamp::now()))
            .unwrap();
        assert_eq!(view.indicators["BTCD"].value, 52.5);
        assert_eq!(view.indicators["DXY_TWEX"].value, 121.4);
        assert!(!view.indicators.contains_key("FEAR_GREED"));
    }

    #[test]
    fn take_profit_fires_once_per_cooloff() {
        let db = ingested_db();
        let alerts = MemoryAlerts::default();
        let now = timestamp::now();

        let first = db
            .with_store(|s| run_rules(s, &alerts, "Default", &rule_settings(), now))
            .unwrap();
        assert_eq!(first.take_profit, 2);
        assert_eq!(first.rebalance, 0);

        let again = db
            .with_store(|s| run_rules(s, &alerts, "Default", &rule_settings(), now))
            .unwrap();
        assert_eq!(again.take_profit, 0);

        let later = now + chrono::Duration::days(2);
        let after_cooloff = db
            .with_store(|s| run_rules(s, &alerts, "Default", &rule_settings(), later))
            .unwrap();
        assert_eq!(after_cooloff.take_profit, 2);

        let logged = alerts.recent(10).unwrap();
        assert_eq!(logged.len(), 4);
        assert!(logged[0]["message"].as_str().unwrap().starts_with("BTC: Value >= 2.0x cost"));
    }

    #[test]
    fn rules_for_unknown_portfolio_do_nothing() {
        let db = ingested_db();
        let alerts = MemoryAlerts::default();
        let outcome = db
            .with_store(|s| run_rules(s, &alerts, "Nope", &rule_settings(), timestamp::now()))
            .unwrap();
        assert_eq!(outcome.take_profit + outcome.rebalance, 0);
    }

    #[test]
    fn alerts_land_in_jsonl_log() {
        let dir = TempDir::new().unwrap();
        let log = JsonlAlertAdapter::new(dir.path().join("logs/alerts.jsonl"));
        let db = ingested_db();
        db.with_store(|s| run_rules(s, &log, "Default", &rule_settings(), timestamp::now()))
            .unwrap();

        let recent = log.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0]["type"], "take_profit");
        assert_eq!(recent[0]["payload"]["multiple"], 3.0);
    }
}

mod views {
    use super::*;

    #[test]
    fn portfolio_totals_after_fetch() {
        let db = ingested_db();
        let view = db
            .with_store(|s| portfolio_view(s, Some("Default")))
            .unwrap();
        assert_relative_eq!(view.total_mv_usd, 60_100.0);
        assert_relative_eq!(view.total_mv_gbp, 48_080.0);
        assert!(view.as_of.is_some());
    }

    #[test]
    fn changes_convert_with_stored_rate() {
        let db = ingested_db();
        let report = db
            .with_store(|s| compute_changes(s, "gbp", Some("Default")))
            .unwrap();
        assert!(report.ok);
        assert_eq!(report.ccy, "GBP");
        assert_relative_eq!(report.changes["BTC"].latest, 48_000.0);
        assert_eq!(report.changes["BTC"].pcts.d1, None);
    }

    #[test]
    fn health_and_repair_after_fetch() {
        let db = ingested_db();
        let health = db.with_store(|s| verify_health(s)).unwrap();
        assert_eq!(health.assets_total, 2);

        db.with_transaction(|s| carry_forward(s, timestamp::now()))
            .unwrap();
        assert!(db.compact(timestamp::now()).is_ok());
    }
}

mod configuration {
    use super::*;

    #[test]
    fn environment_overrides_file_values() {
        let file = FileConfigAdapter::from_string(
            "[database]\npath = x.db\n[portfolio]\nname = FromFile\n[rules]\ncooloff_days = 3\n",
        )
        .unwrap();
        let config = EnvConfigAdapter::with_vars(
            file,
            [
                ("BALANCER_PORTFOLIO_NAME".to_string(), "FromEnv".to_string()),
                ("COINGECKO_API_KEY".to_string(), "demo-key".to_string()),
            ],
        );
        let settings = Settings::from_config(&config).unwrap();
        assert_eq!(settings.portfolio.name, "FromEnv");
        assert_eq!(settings.rules.cooloff_days, 3);
        assert_eq!(settings.coingecko.api_key.as_deref(), Some("demo-key"));

        let rules = RuleSettings::from(&settings.rules);
        assert_eq!(rules.cooloff, chrono::Duration::days(3));
        assert_eq!(rules.ladder, vec![2.0, 3.0, 5.0]);
    }
}
