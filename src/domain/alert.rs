//! Alert log entries.

use serde::{Deserialize, Serialize};

use crate::domain::timestamp;

pub const SEVERITY_INFO: &str = "info";

/// One line of the JSONL alert log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEntry {
    pub at: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: String,
    pub message: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl AlertEntry {
    pub fn info(kind: &str, message: String, payload: serde_json::Value) -> Self {
        Self {
            at: timestamp::to_iso(timestamp::now()),
            kind: kind.to_string(),
            severity: SEVERITY_INFO.to_string(),
            message,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_kind_as_type() {
        let entry = AlertEntry {
            at: "2024-01-01T00:00:00Z".into(),
            kind: "take_profit".into(),
            severity: "info".into(),
            message: "BTC: Value >= 2.0x cost".into(),
            payload: json!({"multiple": 2.0}),
        };
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["type"], "take_profit");
        assert_eq!(v["payload"]["multiple"], 2.0);
        assert!(v.get("kind").is_none());
    }

    #[test]
    fn info_stamps_current_time() {
        let entry = AlertEntry::info("rebalance", "msg".into(), json!({}));
        assert!(entry.at.ends_with('Z'));
        assert_eq!(entry.severity, "info");
    }
}
