//! Shared parsing utilities for vendor payloads.
//!
//! Common timestamp and value parsing used across the vendor normalizers.
//! Each vendor stamps its readings in its own format; everything is
//! normalized to UTC instants.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Parses an Atmotube timestamp (`2021-10-11T09:46:00.000Z`, with or
/// without the fractional part).
#[must_use]
pub fn parse_atmotube_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.fZ") {
        return Some(naive.and_utc());
    }
    None
}

/// Parses a ThingSpeak `created_at` timestamp (`2021-10-11T09:46:00Z`).
#[must_use]
pub fn parse_thingspeak_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parses an SQL timestamp literal (`2021-10-11 09:46:00`).
#[must_use]
pub fn parse_sql_timestamp(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Converts a raw JSON scalar to its textual measurement value.
///
/// `Null` (and missing values mapped through `Option`) stay `None` so the
/// destination row keeps `NULL` instead of a coerced zero. Composite values
/// have no textual form and also map to `None`.
#[must_use]
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Array(_) | Value::Object(_) => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
    }
}

/// Parses a JSON scalar as a decimal-degree coordinate.
#[must_use]
pub fn value_to_coord(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}
