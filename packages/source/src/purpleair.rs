//! PurpleAir sensor-registry normalizer.
//!
//! The registry endpoint answers with a flat array-of-arrays: a `fields`
//! header row naming each column and a `data` list of equally long rows.
//! Rows are zipped with the header, optionally renamed through a field
//! alias table, and stamped with the caller-supplied observation instant —
//! the payload itself carries no per-row timestamp.

use std::collections::BTreeMap;

use air_sync_source_models::{Geolocation, NormalizedRecord};
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::parsing::{value_to_coord, value_to_text};
use crate::{NormalizedPage, SourceError, require_key};

/// Normalizes one registry payload.
///
/// Columns named `latitude`/`longitude` (after aliasing) become the
/// record's geolocation instead of parameters; everything else passes
/// through as a `(name, value)` pair in header order.
///
/// # Errors
///
/// Returns [`SourceError::Schema`] when `fields` or `data` is missing and
/// [`SourceError::Normalization`] when a data row does not line up with
/// the header.
pub fn normalize(
    payload: &Value,
    aliases: &BTreeMap<String, String>,
    observed_at: DateTime<Utc>,
) -> Result<NormalizedPage, SourceError> {
    let headers = string_array(require_key(payload, "fields")?, "fields")?;

    let rows = require_key(payload, "data")?
        .as_array()
        .ok_or_else(|| SourceError::Normalization {
            message: "'data' is not an array".to_string(),
        })?;

    let mut records = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let cells = row.as_array().ok_or_else(|| SourceError::Normalization {
            message: format!("data row {index} is not an array"),
        })?;
        if cells.len() != headers.len() {
            return Err(SourceError::Normalization {
                message: format!(
                    "data row {index} has {} cells, header has {}",
                    cells.len(),
                    headers.len()
                ),
            });
        }

        let mut latitude = None;
        let mut longitude = None;
        let mut parameters = Vec::with_capacity(cells.len());
        for (header, cell) in headers.iter().zip(cells) {
            let name = aliases.get(*header).map_or(*header, String::as_str);
            match name {
                "latitude" => latitude = value_to_coord(cell),
                "longitude" => longitude = value_to_coord(cell),
                _ => parameters.push((name.to_string(), value_to_text(cell))),
            }
        }

        let geolocation = match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Geolocation {
                latitude,
                longitude,
            }),
            _ => None,
        };

        records.push(NormalizedRecord {
            timestamp: observed_at,
            geolocation,
            parameters,
        });
    }

    Ok(NormalizedPage {
        records,
        rejected: Vec::new(),
    })
}

/// Interprets a JSON value as an array of strings.
fn string_array<'a>(value: &'a Value, key: &str) -> Result<Vec<&'a str>, SourceError> {
    value
        .as_array()
        .and_then(|items| items.iter().map(Value::as_str).collect::<Option<Vec<_>>>())
        .ok_or_else(|| SourceError::Normalization {
            message: format!("'{key}' is not an array of strings"),
        })
}
