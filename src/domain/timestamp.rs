//! UTC timestamp helpers.
//!
//! Observations are stored as `YYYY-MM-DD HH:MM:SS` text so that SQLite's
//! `date()`/`strftime()` can bucket them and lexical order is time order.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().with_nanosecond(0).unwrap_or_else(|| Utc::now().naive_utc())
}

pub fn format(ts: NaiveDateTime) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

/// Accepts the storage format, ISO-8601 with `T`, fractional seconds and a
/// trailing `Z`, or a bare date.
pub fn parse(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    let no_zone = trimmed.trim_end_matches('Z');
    for fmt in [
        STORAGE_FORMAT,
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(no_zone, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(no_zone, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// ISO-8601 rendering used in JSON payloads (`2024-01-01T00:00:00Z`).
pub fn to_iso(ts: NaiveDateTime) -> String {
    format!("{}Z", ts.format("%Y-%m-%dT%H:%M:%S"))
}

pub fn from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

pub fn millis(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_millis()
}

pub fn floor_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(ts)
}

pub fn floor_day(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_hms_opt(0, 0, 0).unwrap_or(ts)
}

/// Bucket starts for the last `count` hours, newest first.
pub fn hourly_buckets(now: NaiveDateTime, count: i64) -> Vec<NaiveDateTime> {
    let end = floor_hour(now);
    (0..count).map(|i| end - Duration::hours(i)).collect()
}

/// Bucket starts for the last `count` days, newest first.
pub fn daily_buckets(now: NaiveDateTime, count: i64) -> Vec<NaiveDateTime> {
    let end = floor_day(now);
    (0..count).map(|i| end - Duration::days(i)).collect()
}
