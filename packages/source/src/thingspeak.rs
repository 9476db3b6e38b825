//! ThingSpeak station-feed normalizer.
//!
//! A feed payload nests the channel metadata (`channel`) next to the
//! readings (`feeds`). The channel object maps vendor field slots
//! (`field1`..`field8`) to human-readable labels; which label belongs to
//! which canonical parameter depends on the board (primary vs. `_b`
//! secondary) and the channel flavor (atmospheric vs. particle counts),
//! and the only signal for that in the payload is the channel's declared
//! name. The substring sniffing lives in [`field_table_for`] so it can be
//! tested against every known name pattern in one place.

use air_sync_source_models::NormalizedRecord;
use serde_json::Value;

use crate::parsing::{parse_thingspeak_timestamp, value_to_text};
use crate::{NormalizedPage, SourceError, require_key};

/// Label-to-canonical mapping for the primary board, atmospheric channel.
const PRIMARY_A: &[(&str, &str)] = &[
    ("PM1.0 (ATM)", "pm1.0_atm_a"),
    ("PM2.5 (ATM)", "pm2.5_atm_a"),
    ("PM10.0 (ATM)", "pm10.0_atm_a"),
    ("Temperature", "temperature_a"),
    ("Humidity", "humidity_a"),
];

/// Label-to-canonical mapping for the secondary board, atmospheric channel.
const PRIMARY_B: &[(&str, &str)] = &[
    ("PM1.0 (ATM)", "pm1.0_atm_b"),
    ("PM2.5 (ATM)", "pm2.5_atm_b"),
    ("PM10.0 (ATM)", "pm10.0_atm_b"),
    ("Pressure", "pressure_b"),
];

/// Label-to-canonical mapping for the primary board, particle-count channel.
const COUNTS_A: &[(&str, &str)] = &[
    ("0.3um", "0.3_um_count_a"),
    ("0.5um", "0.5_um_count_a"),
    ("1.0um", "1.0_um_count_a"),
    ("2.5um", "2.5_um_count_a"),
    ("5.0um", "5.0_um_count_a"),
    ("10.0um", "10.0_um_count_a"),
];

/// Label-to-canonical mapping for the secondary board, particle-count
/// channel.
const COUNTS_B: &[(&str, &str)] = &[
    ("0.3um", "0.3_um_count_b"),
    ("0.5um", "0.5_um_count_b"),
    ("1.0um", "1.0_um_count_b"),
    ("2.5um", "2.5_um_count_b"),
    ("5.0um", "5.0_um_count_b"),
    ("10.0um", "10.0_um_count_b"),
];

/// Selects the remapping table for a channel from its declared name.
///
/// `_b` marks the secondary board; `Counters` marks the particle-count
/// channel. The vendor payload has no stronger type field, so this
/// substring match is the contract.
#[must_use]
pub fn field_table_for(channel_name: &str) -> &'static [(&'static str, &'static str)] {
    let secondary_board = channel_name.contains("_b");
    let particle_counts = channel_name.contains("Counters");
    match (particle_counts, secondary_board) {
        (false, false) => PRIMARY_A,
        (false, true) => PRIMARY_B,
        (true, false) => COUNTS_A,
        (true, true) => COUNTS_B,
    }
}

/// Normalizes one feed payload.
///
/// Per-record timestamp policy: fixed stations do not emit garbage
/// timestamps, so an unparseable `created_at` means a malformed page and
/// aborts it with [`SourceError::Timestamp`].
///
/// # Errors
///
/// Returns [`SourceError::Schema`] for a missing `feeds`, `channel`,
/// `name`, or `created_at` key, and [`SourceError::Timestamp`] for an
/// unparseable `created_at`.
pub fn normalize(payload: &Value) -> Result<NormalizedPage, SourceError> {
    let feeds = require_key(payload, "feeds")?
        .as_array()
        .ok_or_else(|| SourceError::Normalization {
            message: "'feeds' is not an array".to_string(),
        })?;
    if feeds.is_empty() {
        return Ok(NormalizedPage::empty());
    }

    let channel = require_key(payload, "channel")?;
    let name = require_key(channel, "name")?
        .as_str()
        .ok_or_else(|| SourceError::Normalization {
            message: "channel 'name' is not a string".to_string(),
        })?;
    let table = field_table_for(name);

    // Resolve which fieldN slots carry which canonical parameter, in slot
    // order (field1..field8).
    let mut slots: Vec<(String, &str)> = Vec::new();
    if let Some(meta) = channel.as_object() {
        for (slot, label) in meta {
            if let Some(label) = label.as_str() {
                if let Some(&(_, canonical)) = table.iter().find(|(l, _)| *l == label) {
                    slots.push((slot.clone(), canonical));
                }
            }
        }
    }

    let mut records = Vec::with_capacity(feeds.len());
    for feed in feeds {
        let created_at = require_key(feed, "created_at")?
            .as_str()
            .ok_or_else(|| SourceError::Normalization {
                message: "'created_at' is not a string".to_string(),
            })?;
        let timestamp =
            parse_thingspeak_timestamp(created_at).ok_or_else(|| SourceError::Timestamp {
                value: created_at.to_string(),
            })?;

        let parameters = slots
            .iter()
            .map(|(slot, canonical)| {
                let value = feed.get(slot).and_then(value_to_text);
                ((*canonical).to_string(), value)
            })
            .collect();

        records.push(NormalizedRecord {
            timestamp,
            geolocation: None,
            parameters,
        });
    }

    Ok(NormalizedPage {
        records,
        rejected: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn sniffing_selects_primary_a_by_default() {
        assert_eq!(field_table_for("AirMonitor_eea0"), PRIMARY_A);
    }

    #[test]
    fn sniffing_selects_secondary_board_on_b_marker() {
        assert_eq!(field_table_for("AirMonitor_eea0_b"), PRIMARY_B);
    }

    #[test]
    fn sniffing_selects_particle_counts_on_counters_marker() {
        assert_eq!(field_table_for("AirMonitor_eea0 Counters"), COUNTS_A);
        assert_eq!(field_table_for("AirMonitor_eea0_b Counters"), COUNTS_B);
    }

    #[test]
    fn reshapes_feeds_through_the_selected_table() {
        let payload = json!({
            "channel": {
                "id": 1_145_678,
                "name": "AirMonitor_eea0",
                "field1": "PM1.0 (ATM)",
                "field2": "PM2.5 (ATM)",
                "field6": "Temperature",
            },
            "feeds": [
                {
                    "created_at": "2021-10-11T01:33:44Z",
                    "field1": "3.1",
                    "field2": "7.5",
                    "field6": "22",
                },
            ],
        });

        let page = normalize(&payload).unwrap();
        assert_eq!(page.records.len(), 1);
        let record = &page.records[0];
        assert_eq!(record.timestamp.to_string(), "2021-10-11 01:33:44 UTC");
        assert!(record.geolocation.is_none());
        assert_eq!(
            record.parameters,
            vec![
                ("pm1.0_atm_a".to_string(), Some("3.1".to_string())),
                ("pm2.5_atm_a".to_string(), Some("7.5".to_string())),
                ("temperature_a".to_string(), Some("22".to_string())),
            ]
        );
    }

    #[test]
    fn null_field_value_stays_none() {
        let payload = json!({
            "channel": {
                "name": "AirMonitor_eea0",
                "field1": "PM1.0 (ATM)",
                "field2": "PM2.5 (ATM)",
            },
            "feeds": [
                {"created_at": "2021-10-11T01:33:44Z", "field1": null, "field2": "7.5"},
            ],
        });

        let page = normalize(&payload).unwrap();
        assert_eq!(
            page.records[0].parameters,
            vec![
                ("pm1.0_atm_a".to_string(), None),
                ("pm2.5_atm_a".to_string(), Some("7.5".to_string())),
            ]
        );
    }

    #[test]
    fn empty_feeds_returns_empty_page() {
        let payload = json!({"channel": {"name": "AirMonitor_eea0"}, "feeds": []});
        assert_eq!(normalize(&payload).unwrap(), NormalizedPage::empty());
    }

    #[test]
    fn missing_channel_names_the_key() {
        let payload = json!({"feeds": [{"created_at": "2021-10-11T01:33:44Z"}]});
        let err = normalize(&payload).unwrap_err();
        assert!(matches!(err, SourceError::Schema { key } if key == "channel"));
    }

    #[test]
    fn missing_created_at_names_the_key() {
        let payload = json!({
            "channel": {"name": "AirMonitor_eea0"},
            "feeds": [{"field1": "3.1"}],
        });
        let err = normalize(&payload).unwrap_err();
        assert!(matches!(err, SourceError::Schema { key } if key == "created_at"));
    }

    #[test]
    fn unparseable_created_at_aborts_the_page() {
        let payload = json!({
            "channel": {"name": "AirMonitor_eea0"},
            "feeds": [{"created_at": "yesterday"}],
        });
        let err = normalize(&payload).unwrap_err();
        assert!(matches!(err, SourceError::Timestamp { value } if value == "yesterday"));
    }
}
