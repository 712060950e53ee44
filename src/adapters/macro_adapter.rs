//! FRED and alternative.me Fear & Greed clients implementing
//! [`MacroDataPort`].

use serde_json::Value;

use crate::adapters::http_client::{join_url, HttpClient};
use crate::domain::error::BalancerError;
use crate::domain::settings::MacroSettings;
use crate::ports::market_port::MacroDataPort;

pub struct MacroAdapter {
    http: HttpClient,
    settings: MacroSettings,
}

impl MacroAdapter {
    pub fn new(http: HttpClient, settings: MacroSettings) -> Self {
        Self { http, settings }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

/// Newest numeric `observations[].value`. FRED reports gaps as `"."`.
pub fn parse_fred_latest(doc: &Value) -> Option<f64> {
    doc.get("observations")?
        .as_array()?
        .iter()
        .rev()
        .find_map(|o| o.get("value").and_then(as_number))
}

/// `data[0].value`, which the API encodes as a string.
pub fn parse_fear_greed(doc: &Value) -> Option<f64> {
    doc.pointer("/data/0/value").and_then(as_number)
}

impl MacroDataPort for MacroAdapter {
    fn fred_latest(&self, series_id: &str) -> Result<Option<f64>, BalancerError> {
        let Some(api_key) = &self.settings.fred_api_key else {
            log::debug!("no FRED api key configured, skipping {series_id}");
            return Ok(None);
        };
        let doc: Value = self.http.get_json(
            &join_url(&self.settings.fred_url, "series/observations"),
            &[
                ("series_id", series_id.to_string()),
                ("api_key", api_key.clone()),
                ("file_type", "json".to_string()),
            ],
        )?;
        Ok(parse_fred_latest(&doc))
    }

    fn fear_greed_latest(&self) -> Result<Option<f64>, BalancerError> {
        let doc: Value = self
            .http
            .get_json(&join_url(&self.settings.fear_greed_url, "fng/"), &[])?;
        Ok(parse_fear_greed(&doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::{HttpSettings, DEFAULT_DXY_SERIES};
    use serde_json::json;

    #[test]
    fn fred_skips_missing_observations() {
        let doc = json!({"observations": [
            {"date": "2024-01-01", "value": "120.5"},
            {"date": "2024-01-02", "value": "121.25"},
            {"date": "2024-01-03", "value": "."}
        ]});
        assert_eq!(parse_fred_latest(&doc), Some(121.25));
        assert_eq!(parse_fred_latest(&json!({"observations": []})), None);
        assert_eq!(parse_fred_latest(&json!({})), None);
    }

    #[test]
    fn fear_greed_string_value() {
        let doc = json!({
            "name": "Fear and Greed Index",
            "data": [{"value": "72", "value_classification": "Greed"}]
        });
        assert_eq!(parse_fear_greed(&doc), Some(72.0));
        assert_eq!(parse_fear_greed(&json!({"data": []})), None);
        assert_eq!(parse_fear_greed(&json!({"data": [{"value": "n/a"}]})), None);
    }

    #[test]
    fn fred_without_key_is_skipped() {
        let http = HttpClient::new(&HttpSettings { timeout_secs: 1, retries: 0 }).unwrap();
        let adapter = MacroAdapter::new(
            http,
            MacroSettings {
                fred_url: "http://127.0.0.1:9".into(),
                fred_api_key: None,
                dxy_series: DEFAULT_DXY_SERIES.into(),
                fear_greed_url: "http://127.0.0.1:9".into(),
            },
        );
        assert_eq!(adapter.fred_latest(DEFAULT_DXY_SERIES).unwrap(), None);
    }
}
