//! Configuration validation.
//!
//! Validates all config fields before any command touches the database or
//! the network.

use std::net::SocketAddr;

use crate::domain::error::BalancerError;
use crate::domain::settings::{parse_ladder, DEFAULT_LADDER};
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), BalancerError> {
    validate_database(config)?;
    validate_http(config)?;
    validate_coingecko(config)?;
    validate_rules(config)?;
    Ok(())
}

/// Extra checks for `serve`.
pub fn validate_server_config(config: &dyn ConfigPort) -> Result<(), BalancerError> {
    validate_bind(config)
}

fn invalid(section: &str, key: &str, reason: &str) -> BalancerError {
    BalancerError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_database(config: &dyn ConfigPort) -> Result<(), BalancerError> {
    match config.get_string("database", "path") {
        Some(path) if !path.trim().is_empty() => {}
        _ => {
            return Err(BalancerError::ConfigMissing {
                section: "database".to_string(),
                key: "path".to_string(),
            });
        }
    }
    if config.get_int("database", "pool_size", 4) < 1 {
        return Err(invalid("database", "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

fn validate_http(config: &dyn ConfigPort) -> Result<(), BalancerError> {
    if config.get_int("http", "timeout_secs", 20) <= 0 {
        return Err(invalid("http", "timeout_secs", "timeout_secs must be positive"));
    }
    if config.get_int("http", "retries", 2) < 0 {
        return Err(invalid("http", "retries", "retries must be non-negative"));
    }
    Ok(())
}

fn validate_coingecko(config: &dyn ConfigPort) -> Result<(), BalancerError> {
    let per_page = config.get_int("coingecko", "per_page", 250);
    if !(1..=250).contains(&per_page) {
        return Err(invalid("coingecko", "per_page", "per_page must be between 1 and 250"));
    }
    if config.get_int("coingecko", "throttle_ms", 800) < 0 {
        return Err(invalid("coingecko", "throttle_ms", "throttle_ms must be non-negative"));
    }
    Ok(())
}

fn validate_rules(config: &dyn ConfigPort) -> Result<(), BalancerError> {
    let ladder = config
        .get_string("rules", "take_profit_ladder")
        .unwrap_or_else(|| DEFAULT_LADDER.to_string());
    parse_ladder(&ladder)?;
    if config.get_int("rules", "cooloff_days", 1) < 0 {
        return Err(invalid("rules", "cooloff_days", "cooloff_days must be non-negative"));
    }
    Ok(())
}

fn validate_bind(config: &dyn ConfigPort) -> Result<(), BalancerError> {
    if let Some(bind) = config.get_string("server", "bind") {
        if bind.trim().parse::<SocketAddr>().is_err() {
            return Err(invalid("server", "bind", "bind must be host:port"));
        }
    }
    Ok(())
}
