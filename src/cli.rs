//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::coingecko_adapter::CoingeckoAdapter;
use crate::adapters::csv_adapter::{export_portfolio_csv, import_portfolio_csv};
use crate::adapters::env_config_adapter::EnvConfigAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::http_client::HttpClient;
use crate::adapters::jsonl_alert_adapter::JsonlAlertAdapter;
use crate::adapters::macro_adapter::MacroAdapter;
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::backfill::backfill;
use crate::domain::config_validation::{validate_config, validate_server_config};
use crate::domain::error::BalancerError;
use crate::domain::health::verify_health;
use crate::domain::importer::{import_portfolio_json, import_tokenlist};
use crate::domain::indicators::fetch_and_store;
use crate::domain::prices::{ids_to_fetch, run_price_fetch};
use crate::domain::repair::carry_forward;
use crate::domain::resolver::{resolve_missing, DEFAULT_LIMIT};
use crate::domain::rules::{run_rules, RuleSettings};
use crate::domain::settings::Settings;
use crate::domain::timestamp;
use crate::domain::valuation::export_view;

#[derive(Parser, Debug)]
#[command(name = "balancer", about = "Crypto portfolio tracker and rebalancing alerts")]
pub struct Cli {
    /// INI configuration file; without one only defaults and BALANCER_* variables apply
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    InitDb,
    /// Fetch prices and indicators, then evaluate rules
    Fetch,
    /// Fetch current prices
    Prices,
    /// Fetch macro indicators
    Indicators,
    /// Evaluate take-profit and rebalance rules
    Rules,
    /// Import a tab separated tokenlist export
    ImportTokenlist { path: PathBuf },
    /// Import a `{ "assets": [...] }` JSON document
    ImportJson { path: PathBuf },
    /// Import positions from CSV
    ImportCsv { path: PathBuf },
    /// Export positions to CSV
    ExportCsv { path: PathBuf },
    /// Export the valued portfolio as JSON (stdout when no path is given)
    ExportJson { path: Option<PathBuf> },
    /// Thin out old price and FX history
    Compact,
    /// Carry the last known values forward into empty buckets
    Repair,
    /// Load historical prices and FX rates, then compact
    Backfill {
        /// Days of history, or "max"
        #[arg(long)]
        days: Option<String>,
    },
    /// Report price and FX coverage
    Health,
    /// Propose Coingecko ids for held assets without one
    ResolveCg,
    /// Start the web server
    Serve,
}

/// Loaded configuration plus the database every command needs.
struct App {
    settings: Settings,
    db: SqliteAdapter,
}

pub fn run(cli: Cli) -> ExitCode {
    let config = cli.config.as_deref();
    let result = match cli.command {
        Command::InitDb => run_init_db(config),
        Command::Fetch => run_fetch(config),
        Command::Prices => run_prices(config),
        Command::Indicators => run_indicators(config),
        Command::Rules => run_rules_command(config),
        Command::ImportTokenlist { path } => run_import_tokenlist(config, &path),
        Command::ImportJson { path } => run_import_json(config, &path),
        Command::ImportCsv { path } => run_import_csv(config, &path),
        Command::ExportCsv { path } => run_export_csv(config, &path),
        Command::ExportJson { path } => run_export_json(config, path.as_deref()),
        Command::Compact => run_compact(config),
        Command::Repair => run_repair(config),
        Command::Backfill { days } => run_backfill(config, days.as_deref()),
        Command::Health => run_health(config),
        Command::ResolveCg => run_resolve(config),
        Command::Serve => run_serve(config),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(
    path: Option<&Path>,
) -> Result<EnvConfigAdapter<FileConfigAdapter>, BalancerError> {
    let file = match path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            FileConfigAdapter::from_file(path).map_err(|e| BalancerError::ConfigParse {
                file: path.display().to_string(),
                reason: e.to_string(),
            })?
        }
        None => FileConfigAdapter::empty(),
    };
    Ok(EnvConfigAdapter::from_env(file))
}

fn open(config_path: Option<&Path>) -> Result<App, BalancerError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;
    let settings = Settings::from_config(&config)?;
    let db = SqliteAdapter::from_config(&config)?;
    db.initialize_schema()?;
    Ok(App { settings, db })
}

fn http(settings: &Settings) -> Result<HttpClient, BalancerError> {
    HttpClient::new(&settings.http)
}

fn coingecko(settings: &Settings) -> Result<CoingeckoAdapter, BalancerError> {
    Ok(CoingeckoAdapter::new(http(settings)?, settings.coingecko.clone()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), BalancerError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| BalancerError::Decode {
        what: "output".into(),
        reason: e.to_string(),
    })?;
    println!("{out}");
    Ok(())
}

fn run_init_db(config: Option<&Path>) -> Result<(), BalancerError> {
    let app = open(config)?;
    eprintln!("Database ready at {}", app.db.path());
    Ok(())
}

fn fetch_prices(app: &App) -> Result<(), BalancerError> {
    let market = coingecko(&app.settings)?;
    let mapping = app.settings.coingecko.mapping_file.as_deref().map(Path::new);
    let report = app.db.with_store(|store| {
        let ids = ids_to_fetch(store, mapping)?;
        run_price_fetch(store, &market, &ids, timestamp::now())
    })?;
    eprintln!(
        "Stored {} prices ({} in BTC) for {} ids",
        report.stored, report.btc_stored, report.ids
    );
    if let Some(rate) = report.gbp_usd {
        eprintln!("GBP/USD {rate:.4}");
    }
    Ok(())
}

fn fetch_indicators(app: &App) -> Result<(), BalancerError> {
    let market = coingecko(&app.settings)?;
    let macro_data = MacroAdapter::new(http(&app.settings)?, app.settings.macro_data.clone());
    let stored = app.db.with_store(|store| {
        fetch_and_store(
            store,
            &market,
            &macro_data,
            &app.settings.macro_data.dxy_series,
            timestamp::now(),
        )
    })?;
    for obs in &stored {
        eprintln!("{} = {}", obs.name, obs.value);
    }
    eprintln!("Stored {} indicators", stored.len());
    Ok(())
}

fn evaluate_rules(app: &App) -> Result<(), BalancerError> {
    let alerts = JsonlAlertAdapter::new(&app.settings.rules.alerts_file);
    let rule_settings = RuleSettings::from(&app.settings.rules);
    let outcome = app.db.with_store(|store| {
        run_rules(
            store,
            &alerts,
            &app.settings.portfolio.name,
            &rule_settings,
            timestamp::now(),
        )
    })?;
    eprintln!(
        "Rules: {} take-profit, {} rebalance alerts",
        outcome.take_profit, outcome.rebalance
    );
    Ok(())
}

fn run_fetch(config: Option<&Path>) -> Result<(), BalancerError> {
    let app = open(config)?;
    fetch_prices(&app)?;
    fetch_indicators(&app)?;
    evaluate_rules(&app)
}

fn run_prices(config: Option<&Path>) -> Result<(), BalancerError> {
    fetch_prices(&open(config)?)
}

fn run_indicators(config: Option<&Path>) -> Result<(), BalancerError> {
    fetch_indicators(&open(config)?)
}

fn run_rules_command(config: Option<&Path>) -> Result<(), BalancerError> {
    evaluate_rules(&open(config)?)
}

fn run_import_tokenlist(config: Option<&Path>, path: &Path) -> Result<(), BalancerError> {
    let app = open(config)?;
    let content = fs::read_to_string(path)?;
    let summary = app.db.with_transaction(|store| {
        import_tokenlist(
            store,
            &content,
            &app.settings.portfolio.name,
            &app.settings.portfolio.avg_cost_ccy,
        )
    })?;
    eprintln!(
        "Imported {} assets ({} skipped) from {}",
        summary.assets,
        summary.skipped,
        path.display()
    );
    Ok(())
}

fn run_import_json(config: Option<&Path>, path: &Path) -> Result<(), BalancerError> {
    let app = open(config)?;
    let content = fs::read_to_string(path)?;
    let summary = app.db.with_transaction(|store| {
        import_portfolio_json(
            store,
            &content,
            &app.settings.portfolio.name,
            &app.settings.portfolio.avg_cost_ccy,
        )
    })?;
    eprintln!(
        "Imported {} assets ({} skipped) from {}",
        summary.assets,
        summary.skipped,
        path.display()
    );
    Ok(())
}

fn run_import_csv(config: Option<&Path>, path: &Path) -> Result<(), BalancerError> {
    let app = open(config)?;
    let summary = app.db.with_transaction(|store| {
        import_portfolio_csv(
            store,
            path,
            &app.settings.portfolio.name,
            &app.settings.portfolio.base_currency,
        )
    })?;
    eprintln!("Imported {} positions from {}", summary.assets, path.display());
    Ok(())
}

fn run_export_csv(config: Option<&Path>, path: &Path) -> Result<(), BalancerError> {
    let app = open(config)?;
    let rows = app
        .db
        .with_store(|store| export_portfolio_csv(store, path, &app.settings.portfolio.name))?;
    eprintln!("Wrote {rows} positions to {}", path.display());
    Ok(())
}

fn run_export_json(config: Option<&Path>, path: Option<&Path>) -> Result<(), BalancerError> {
    let app = open(config)?;
    let view = app
        .db
        .with_store(|store| export_view(store, &app.settings.portfolio.name))?;
    match path {
        Some(path) => {
            let out = serde_json::to_string_pretty(&view).map_err(|e| BalancerError::Decode {
                what: "export".into(),
                reason: e.to_string(),
            })?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, out)?;
            eprintln!("Wrote {} assets to {}", view.assets.len(), path.display());
            Ok(())
        }
        None => print_json(&view),
    }
}

fn run_compact(config: Option<&Path>) -> Result<(), BalancerError> {
    let app = open(config)?;
    let deleted = app.db.compact(timestamp::now())?;
    eprintln!("Compaction removed {deleted} rows");
    Ok(())
}

fn run_repair(config: Option<&Path>) -> Result<(), BalancerError> {
    let app = open(config)?;
    let report = app
        .db
        .with_transaction(|store| carry_forward(store, timestamp::now()))?;
    eprintln!(
        "Carried forward {} prices and {} fx rates",
        report.prices, report.fx
    );
    Ok(())
}

fn run_backfill(config: Option<&Path>, days: Option<&str>) -> Result<(), BalancerError> {
    let app = open(config)?;
    let market = coingecko(&app.settings)?;
    let days = days.unwrap_or(&app.settings.backfill_days);
    let mapping = app.settings.coingecko.mapping_file.as_deref().map(Path::new);
    eprintln!("Backfilling {days} days of history");
    let report = app.db.with_store(|store| {
        let ids = ids_to_fetch(store, mapping)?;
        backfill(store, &market, &ids, days)
    })?;
    eprintln!(
        "Stored {} prices, {} BTC/USD and {} GBP/USD rates",
        report.prices, report.btc_fx, report.gbp_fx
    );
    if !report.failed.is_empty() {
        eprintln!("No history for: {}", report.failed.join(", "));
    }
    let deleted = app.db.compact(timestamp::now())?;
    eprintln!("Compaction removed {deleted} rows");
    Ok(())
}

fn run_health(config: Option<&Path>) -> Result<(), BalancerError> {
    let app = open(config)?;
    let report = app.db.with_store(|store| verify_health(store))?;
    print_json(&report)
}

fn run_resolve(config: Option<&Path>) -> Result<(), BalancerError> {
    let app = open(config)?;
    let market = coingecko(&app.settings)?;
    let resolution = app
        .db
        .with_store(|store| resolve_missing(store, &market, DEFAULT_LIMIT))?;
    eprintln!("{} assets without a Coingecko id", resolution.count);
    print_json(&resolution)
}

fn run_serve(config_path: Option<&Path>) -> Result<(), BalancerError> {
    let config = load_config(config_path)?;
    validate_server_config(&config)?;
    serve_web(open(config_path)?)
}

#[cfg(feature = "web")]
fn serve_web(app: App) -> Result<(), BalancerError> {
    use crate::adapters::file_cache_adapter::FileCacheAdapter;
    use crate::adapters::web::{serve, AppState};
    use std::net::SocketAddr;
    use std::sync::Arc;

    let App { settings, db } = app;
    let addr: SocketAddr = settings.server.bind.parse().map_err(|e: std::net::AddrParseError| {
        BalancerError::ConfigInvalid {
            section: "server".into(),
            key: "bind".into(),
            reason: e.to_string(),
        }
    })?;

    let state = AppState {
        db,
        market: Arc::new(coingecko(&settings)?),
        alerts: Arc::new(JsonlAlertAdapter::new(&settings.rules.alerts_file)),
        cache: Arc::new(FileCacheAdapter::new(&settings.server.cache_dir)),
        settings,
    };

    eprintln!("Starting web server on {addr}");
    tokio::runtime::Runtime::new()?.block_on(serve(state, addr))
}

#[cfg(not(feature = "web"))]
fn serve_web(_app: App) -> Result<(), BalancerError> {
    Err(BalancerError::invalid("balancer was built without the web feature"))
}
