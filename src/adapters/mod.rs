//! Concrete adapter implementations for ports.

pub mod coingecko_adapter;
pub mod csv_adapter;
pub mod env_config_adapter;
pub mod file_cache_adapter;
pub mod file_config_adapter;
pub mod http_client;
pub mod jsonl_alert_adapter;
pub mod macro_adapter;
pub mod sqlite_adapter;
#[cfg(feature = "web")]
pub mod web;
