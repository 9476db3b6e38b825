#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Vendor kind, channel, and normalized measurement types.
//!
//! Every vendor API (PurpleAir registry, ThingSpeak station feeds, Atmotube
//! mobile sensors) produces [`NormalizedRecord`] values after reshaping, and
//! the batch builder turns those into [`BatchRow`] insert fragments.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Timestamp format used in every SQL literal this system emits.
pub const SQL_TIMESTAMP_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// SRID used for all stored sensor geometries.
pub const EPSG_SRID: i32 = 26918;

/// The kind of vendor API behind a channel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SensorKind {
    /// PurpleAir sensor registry (flat `fields` + `data` payload).
    Purpleair,
    /// ThingSpeak station feed (`channel` + `feeds` payload).
    Thingspeak,
    /// Atmotube mobile sensor (`data.items` payload).
    Atmotube,
}

impl SensorKind {
    /// Whether sensors of this kind move and therefore carry a geolocation
    /// on every measurement.
    #[must_use]
    pub const fn is_mobile(self) -> bool {
        matches!(self, Self::Atmotube)
    }
}

/// One acquisition stream of one sensor.
///
/// A sensor may own several channels (e.g. the primary and secondary boards
/// of a PurpleAir station each publish through their own ThingSpeak
/// channel). The watermark in `last_acquisition` only moves forward after a
/// successful sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    /// Stable sensor identifier, assigned once at registration.
    pub sensor_id: i32,
    /// Channel name, unique per sensor (e.g. `"primary_a"`).
    pub channel_name: String,
    /// Vendor credential for this channel (opaque).
    pub api_key: String,
    /// Vendor identifier for this channel (opaque; ThingSpeak channel id,
    /// Atmotube MAC address, ...).
    pub api_id: String,
    /// Timestamp of the last successfully ingested reading.
    pub last_acquisition: DateTime<Utc>,
}

/// A decimal-degree point (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geolocation {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
}

impl Geolocation {
    /// Renders this point as a `PostGIS` geometry expression.
    #[must_use]
    pub fn geometry_expr(&self) -> String {
        format!(
            "ST_GeomFromText('POINT({} {})', {EPSG_SRID})",
            self.longitude, self.latitude
        )
    }
}

/// The uniform measurement unit every vendor payload is reshaped into.
///
/// `parameters` keeps the vendor's parameter order; a `None` value means
/// the vendor reported the parameter as absent/null and must stay `NULL`
/// in the destination row, not zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    /// When the reading was taken. Always present; records with a missing
    /// or unparseable timestamp never become `NormalizedRecord`s.
    pub timestamp: DateTime<Utc>,
    /// Where the reading was taken. Only mobile sensors provide this.
    pub geolocation: Option<Geolocation>,
    /// Ordered `(parameter name, raw value)` pairs.
    pub parameters: Vec<(String, Option<String>)>,
}

/// Mapping from vendor parameter name to the stable integer parameter id
/// owned by the persistent store.
///
/// Read-only to the sync engine; looked up once per sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterCatalog {
    ids: BTreeMap<String, i32>,
}

impl ParameterCatalog {
    /// Builds a catalog from `(name, id)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, i32)>,
    {
        Self {
            ids: pairs.into_iter().collect(),
        }
    }

    /// Returns the parameter id for a vendor parameter name, if known.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.ids.get(name).copied()
    }

    /// Number of known parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// One serialized insert fragment for the measurement tables.
///
/// Created transiently per filtered record and consumed by the single
/// batched write of a sync run. `packet_id` is a surrogate id, strictly
/// increasing within one run and never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    /// Surrogate id, unique within the destination table.
    pub packet_id: i64,
    /// Owning sensor.
    pub sensor_id: i32,
    /// Parameter id from the [`ParameterCatalog`].
    pub parameter_id: i32,
    /// Raw value as reported by the vendor; `None` stays `NULL`.
    pub value: Option<String>,
    /// When the reading was taken.
    pub timestamp: DateTime<Utc>,
    /// Optional `PostGIS` geometry expression (mobile sensors only).
    pub geometry: Option<String>,
}

impl BatchRow {
    /// Renders this row as one SQL `VALUES` tuple:
    /// `(packet_id, sensor_id, parameter_id, value, 'timestamp'[, geometry])`.
    ///
    /// The tuple arity follows the destination table, not the row:
    /// `with_geometry` is true for mobile measurement tables, and a mobile
    /// row without a fix renders the literal `NULL` in the geometry slot so
    /// every tuple of a batch has the same width. `None` values render as
    /// the literal token `NULL`; present values are single-quoted string
    /// literals with embedded quotes doubled. The geometry expression is
    /// emitted verbatim since it is already SQL.
    #[must_use]
    pub fn sql_values(&self, with_geometry: bool) -> String {
        let value = self
            .value
            .as_deref()
            .map_or_else(|| "NULL".to_string(), sql_quote);
        let timestamp = self.timestamp.format(SQL_TIMESTAMP_FMT);

        if with_geometry {
            let geometry = self.geometry.as_deref().unwrap_or("NULL");
            format!(
                "({}, {}, {}, {value}, '{timestamp}', {geometry})",
                self.packet_id, self.sensor_id, self.parameter_id
            )
        } else {
            format!(
                "({}, {}, {}, {value}, '{timestamp}')",
                self.packet_id, self.sensor_id, self.parameter_id
            )
        }
    }
}

/// Quotes a string as an SQL literal, doubling embedded single quotes.
#[must_use]
pub fn sql_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}
