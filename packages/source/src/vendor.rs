//! Config-driven vendor definition.
//!
//! [`VendorDefinition`] captures everything unique about a vendor API in a
//! serializable config struct: where it lives, how it pages, and which
//! destination table its measurements land in. Definitions are embedded at
//! compile time (see [`crate::registry`]) and resolved once per sync run.

use std::collections::BTreeMap;

use air_sync_source_models::{Channel, SensorKind};
use chrono::Duration;
use serde::Deserialize;

use crate::window::TimeWindow;

/// A complete vendor API definition.
#[derive(Debug, Clone, Deserialize)]
pub struct VendorDefinition {
    /// Which vendor this is.
    pub kind: SensorKind,
    /// Base API address (no query string).
    pub api_address: String,
    /// Destination measurement table. `None` for vendors that only feed
    /// sensor registration, never time-series sync.
    #[serde(default)]
    pub measure_table: Option<String>,
    /// How the API pages.
    pub fetch: FetchConfig,
    /// Optional renaming of vendor header names to canonical parameter
    /// names, applied by the flat-payload normalizer.
    #[serde(default)]
    pub field_aliases: BTreeMap<String, String>,
}

/// How a vendor API is paged.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FetchConfig {
    /// Bounded time windows from the channel watermark up to now.
    ///
    /// The window length is vendor-imposed: each API caps the rows
    /// returned per call, so too-wide windows silently truncate data and
    /// too-narrow ones waste request quota.
    Windowed {
        /// Window length in days.
        window_days: i64,
    },
    /// A single point-in-time snapshot (sensor registry feeds).
    Snapshot {
        /// Field names to request from the registry endpoint.
        fields: Vec<String>,
    },
}

impl VendorDefinition {
    /// The time-window length for this vendor, or `None` for snapshot
    /// vendors.
    #[must_use]
    pub fn window(&self) -> Option<Duration> {
        match &self.fetch {
            FetchConfig::Windowed { window_days } => Some(Duration::days(*window_days)),
            FetchConfig::Snapshot { .. } => None,
        }
    }

    /// Builds the measurement request URL for one channel and one time
    /// window.
    ///
    /// Snapshot vendors ignore the window and return the registry URL.
    #[must_use]
    pub fn request_url(&self, channel: &Channel, window: &TimeWindow) -> String {
        match self.kind {
            SensorKind::Atmotube => format!(
                "{}?api_key={}&mac={}&date={}&order=asc",
                self.api_address,
                channel.api_key,
                channel.api_id,
                window.begin.format("%Y-%m-%d"),
            ),
            SensorKind::Thingspeak => format!(
                "{}/{}/feeds.json?api_key={}&start={}&end={}",
                self.api_address,
                channel.api_id,
                channel.api_key,
                window.begin.format("%Y-%m-%d%%20%H:%M:%S"),
                window.until.format("%Y-%m-%d%%20%H:%M:%S"),
            ),
            SensorKind::Purpleair => self.snapshot_url(&channel.api_key),
        }
    }

    /// Builds the registry snapshot URL for snapshot vendors.
    ///
    /// For windowed vendors (no `fields` list) this degrades to the bare
    /// API address with only the key.
    #[must_use]
    pub fn snapshot_url(&self, api_key: &str) -> String {
        match &self.fetch {
            FetchConfig::Snapshot { fields } => format!(
                "{}?fields={}&api_key={api_key}",
                self.api_address,
                fields.join(","),
            ),
            FetchConfig::Windowed { .. } => {
                format!("{}?api_key={api_key}", self.api_address)
            }
        }
    }
}

/// Parses a vendor definition from its TOML source.
///
/// # Errors
///
/// Returns a description of the first TOML/shape error encountered.
pub fn parse_vendor_toml(toml_str: &str) -> Result<VendorDefinition, String> {
    toml::de::from_str(toml_str).map_err(|e| e.to_string())
}
