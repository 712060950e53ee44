//! Environment overlay over another [`ConfigPort`].
//!
//! `BALANCER_<SECTION>_<KEY>` overrides `[section] key`. The conventional
//! `COINGECKO_API_KEY` and `FRED_API_KEY` variables fill the API keys when
//! no prefixed override is set.

use std::collections::HashMap;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::ports::config_port::ConfigPort;

pub const ENV_PREFIX: &str = "BALANCER_";

const CONVENTIONAL: [(&str, &str, &str); 2] = [
    ("coingecko", "api_key", "COINGECKO_API_KEY"),
    ("fred", "api_key", "FRED_API_KEY"),
];

pub struct EnvConfigAdapter<C> {
    inner: C,
    vars: HashMap<String, String>,
}

impl<C: ConfigPort> EnvConfigAdapter<C> {
    /// Snapshots the process environment.
    pub fn from_env(inner: C) -> Self {
        Self::with_vars(inner, std::env::vars())
    }

    pub fn with_vars<I>(inner: C, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars = vars
            .into_iter()
            .filter(|(k, _)| {
                k.starts_with(ENV_PREFIX) || CONVENTIONAL.iter().any(|(_, _, name)| k == name)
            })
            .collect();
        Self { inner, vars }
    }

    pub fn env_key(section: &str, key: &str) -> String {
        format!("{ENV_PREFIX}{section}_{key}").to_uppercase()
    }

    fn lookup(&self, section: &str, key: &str) -> Option<&str> {
        let value = self.vars.get(&Self::env_key(section, key)).or_else(|| {
            CONVENTIONAL
                .iter()
                .find(|(s, k, _)| *s == section && *k == key)
                .and_then(|(_, _, name)| self.vars.get(*name))
        })?;
        Some(value.trim()).filter(|v| !v.is_empty())
    }
}

impl<C: ConfigPort> ConfigPort for EnvConfigAdapter<C> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match self.lookup(section, key) {
            Some(v) => Some(v.to_string()),
            None => self.inner.get_string(section, key),
        }
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.lookup(section, key).and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => self.inner.get_int(section, key, default),
        }
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.lookup(section, key).and_then(|v| v.parse().ok()) {
            Some(v) => v,
            None => self.inner.get_double(section, key, default),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.lookup(section, key).and_then(FileConfigAdapter::parse_bool) {
            Some(v) => v,
            None => self.inner.get_bool(section, key, default),
        }
    }
}
