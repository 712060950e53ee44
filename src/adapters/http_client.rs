//! Blocking JSON HTTP client with a timeout and bounded retries.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;

use crate::domain::error::BalancerError;
use crate::domain::settings::HttpSettings;

pub struct HttpClient {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, BalancerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("balancer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BalancerError::Http {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            retries: settings.retries,
            backoff: Duration::from_secs(1),
        })
    }

    /// Base delay between attempts; attempt `n` waits `backoff * (n + 1)`.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    fn get_once<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, BalancerError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(|e| BalancerError::Http {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BalancerError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.json().map_err(|e| BalancerError::Decode {
            what: url.to_string(),
            reason: e.to_string(),
        })
    }

    /// GETs `url` and decodes the JSON body, retrying any failure.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, BalancerError> {
        let mut attempt = 0;
        loop {
            match self.get_once(url, query) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries => {
                    log::debug!("GET {url} failed (attempt {}): {e}", attempt + 1);
                    thread::sleep(self.backoff * (attempt + 1));
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `base` joined with `path`, tolerating a trailing slash on the base.
pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_urls() {
        assert_eq!(
            join_url("https://x/api/v3/", "coins/markets"),
            "https://x/api/v3/coins/markets"
        );
        assert_eq!(join_url("https://x", "/fng/"), "https://x/fng/");
    }

    #[test]
    fn unreachable_host_fails_after_retries() {
        let client = HttpClient::new(&HttpSettings { timeout_secs: 1, retries: 1 })
            .unwrap()
            .with_backoff(Duration::from_millis(1));
        let err = client
            .get_json::<serde_json::Value>("http://127.0.0.1:9/nothing", &[])
            .unwrap_err();
        assert!(matches!(err, BalancerError::Http { .. }));
    }
}
