//! Append-only JSON lines alert log.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use crate::domain::alert::AlertEntry;
use crate::domain::error::BalancerError;
use crate::ports::alert_port::AlertPort;

pub struct JsonlAlertAdapter {
    path: PathBuf,
}

impl JsonlAlertAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AlertPort for JsonlAlertAdapter {
    fn append(&self, entry: &AlertEntry) -> Result<(), BalancerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let line = serde_json::to_string(entry).map_err(|e| BalancerError::Decode {
            what: "alert entry".into(),
            reason: e.to_string(),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<serde_json::Value>, BalancerError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let parsed: Vec<serde_json::Value> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let skip = parsed.len().saturating_sub(limit);
        Ok(parsed.into_iter().skip(skip).collect())
    }
}
