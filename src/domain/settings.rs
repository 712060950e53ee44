//! Typed settings read from a [`ConfigPort`].
//!
//! Every key has a default so a near-empty INI file still yields a usable
//! configuration; only `[database] path` is mandatory (checked by the
//! adapter and by `config_validation`).

use crate::domain::error::BalancerError;
use crate::domain::portfolio::DEFAULT_PORTFOLIO;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_COINGECKO_URL: &str = "https://api.coingecko.com/api/v3";
pub const DEFAULT_FRED_URL: &str = "https://api.stlouisfed.org/fred";
pub const DEFAULT_FEAR_GREED_URL: &str = "https://api.alternative.me";
pub const DEFAULT_DXY_SERIES: &str = "DTWEXBGS";
pub const DEFAULT_LADDER: &str = "2,3,5";

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSettings {
    pub name: String,
    pub base_currency: String,
    /// Currency assigned to the average cost of newly created positions.
    pub avg_cost_ccy: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub retries: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoingeckoSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub per_page: u32,
    pub throttle_ms: u64,
    /// File whose first line lists Coingecko ids, used when no holding is mapped.
    pub mapping_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacroSettings {
    pub fred_url: String,
    pub fred_api_key: Option<String>,
    pub dxy_series: String,
    pub fear_greed_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleSettings {
    pub take_profit_ladder: Vec<f64>,
    pub cooloff_days: i64,
    pub alerts_file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub bind: String,
    pub static_dir: Option<String>,
    pub cache_dir: String,
    pub dev_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub portfolio: PortfolioSettings,
    pub http: HttpSettings,
    pub coingecko: CoingeckoSettings,
    pub macro_data: MacroSettings,
    pub rules: RuleSettings,
    pub server: ServerSettings,
    pub backfill_days: String,
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn string_or(config: &dyn ConfigPort, section: &str, key: &str, default: &str) -> String {
    non_empty(config, section, key).unwrap_or_else(|| default.to_string())
}

/// Parses a comma separated list of take-profit multiples. Blank entries are
/// ignored; the result is sorted ascending.
pub fn parse_ladder(raw: &str) -> Result<Vec<f64>, BalancerError> {
    let mut ladder = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let multiple: f64 = part.parse().map_err(|_| BalancerError::ConfigInvalid {
            section: "rules".into(),
            key: "take_profit_ladder".into(),
            reason: format!("'{part}' is not a number"),
        })?;
        if !multiple.is_finite() || multiple <= 0.0 {
            return Err(BalancerError::ConfigInvalid {
                section: "rules".into(),
                key: "take_profit_ladder".into(),
                reason: format!("multiple {part} must be positive"),
            });
        }
        ladder.push(multiple);
    }
    ladder.sort_by(|a, b| a.total_cmp(b));
    Ok(ladder)
}

impl Settings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, BalancerError> {
        let ladder_raw = string_or(config, "rules", "take_profit_ladder", DEFAULT_LADDER);

        Ok(Self {
            portfolio: PortfolioSettings {
                name: string_or(config, "portfolio", "name", DEFAULT_PORTFOLIO),
                base_currency: string_or(config, "portfolio", "base_currency", "USD")
                    .to_uppercase(),
                avg_cost_ccy: string_or(config, "portfolio", "avg_cost_ccy", "GBP")
                    .to_uppercase(),
            },
            http: HttpSettings {
                timeout_secs: config.get_int("http", "timeout_secs", 20).max(1) as u64,
                retries: config.get_int("http", "retries", 2).clamp(0, 10) as u32,
            },
            coingecko: CoingeckoSettings {
                base_url: string_or(config, "coingecko", "base_url", DEFAULT_COINGECKO_URL),
                api_key: non_empty(config, "coingecko", "api_key"),
                per_page: config.get_int("coingecko", "per_page", 250).clamp(1, 250) as u32,
                throttle_ms: config.get_int("coingecko", "throttle_ms", 800).max(0) as u64,
                mapping_file: non_empty(config, "coingecko", "mapping_file"),
            },
            macro_data: MacroSettings {
                fred_url: string_or(config, "fred", "base_url", DEFAULT_FRED_URL),
                fred_api_key: non_empty(config, "fred", "api_key"),
                dxy_series: string_or(config, "fred", "dxy_series", DEFAULT_DXY_SERIES),
                fear_greed_url: string_or(config, "fear_greed", "base_url", DEFAULT_FEAR_GREED_URL),
            },
            rules: RuleSettings {
                take_profit_ladder: parse_ladder(&ladder_raw)?,
                cooloff_days: config.get_int("rules", "cooloff_days", 1).max(0),
                alerts_file: string_or(config, "rules", "alerts_file", "alerts.jsonl"),
            },
            server: ServerSettings {
                bind: string_or(config, "server", "bind", "127.0.0.1:3000"),
                static_dir: non_empty(config, "server", "static_dir"),
                cache_dir: string_or(config, "server", "cache_dir", ".cache"),
                dev_mode: config.get_bool("server", "dev_mode", false),
            },
            backfill_days: string_or(config, "backfill", "days", "365"),
        })
    }
}
