//! Atmotube mobile-sensor normalizer.
//!
//! The data endpoint answers with a simple list of reading objects under
//! `data.items`; each item carries the measured parameters by name, its own
//! `time`, and — when the paired phone had a fix — a `coords` object.

use air_sync_source_models::{Geolocation, NormalizedRecord};
use serde_json::Value;

use crate::parsing::{parse_atmotube_timestamp, value_to_coord, value_to_text};
use crate::{NormalizedPage, SourceError, require_key};

/// The measured parameters an Atmotube item can carry, in vendor order.
///
/// Items omit parameters their hardware revision lacks; the record still
/// lists every name so the destination rows stay `NULL` instead of absent.
const ATMOTUBE_PARAMS: &[&str] = &["voc", "pm1", "pm25", "pm10", "t", "h", "p"];

/// Normalizes one data page.
///
/// Per-record timestamp policy: mobile uplinks do drop or garble single
/// readings, so an item whose `time` does not parse is dropped from the
/// page and reported in [`NormalizedPage::rejected`]; the page itself
/// continues. A missing `time` key is a payload-shape violation and aborts
/// the page.
///
/// # Errors
///
/// Returns [`SourceError::Schema`] when `data`, `items`, `time`, or a
/// `coords` sub-key is missing.
pub fn normalize(payload: &Value) -> Result<NormalizedPage, SourceError> {
    let items = require_key(require_key(payload, "data")?, "items")?
        .as_array()
        .ok_or_else(|| SourceError::Normalization {
            message: "'items' is not an array".to_string(),
        })?;
    if items.is_empty() {
        return Ok(NormalizedPage::empty());
    }

    let mut records = Vec::with_capacity(items.len());
    let mut rejected = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let time = require_key(item, "time")?;
        let Some(timestamp) = time.as_str().and_then(parse_atmotube_timestamp) else {
            rejected.push(format!("item {index}: unparseable time {time}"));
            continue;
        };

        let geolocation = match item.get("coords") {
            Some(coords) => Some(Geolocation {
                latitude: coord_value(coords, "lat")?,
                longitude: coord_value(coords, "lon")?,
            }),
            None => None,
        };

        let parameters = ATMOTUBE_PARAMS
            .iter()
            .map(|name| {
                let value = item.get(*name).and_then(value_to_text);
                ((*name).to_string(), value)
            })
            .collect();

        records.push(NormalizedRecord {
            timestamp,
            geolocation,
            parameters,
        });
    }

    Ok(NormalizedPage { records, rejected })
}

/// Extracts one coordinate from a `coords` object.
fn coord_value(coords: &Value, key: &str) -> Result<f64, SourceError> {
    let raw = require_key(coords, key)?;
    value_to_coord(raw).ok_or_else(|| SourceError::Normalization {
        message: format!("coords '{key}' is not a coordinate: {raw}"),
    })
}
