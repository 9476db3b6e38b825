#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Vendor API fetching, time-window pagination, and response normalization.
//!
//! Each vendor module reshapes one raw payload shape into the uniform
//! [`NormalizedRecord`](air_sync_source_models::NormalizedRecord) list;
//! [`registry`] holds the embedded vendor definitions and [`window`] the
//! bounded time-window pagination they share.

pub mod atmotube;
pub mod parsing;
pub mod purpleair;
pub mod registry;
pub mod thingspeak;
pub mod vendor;
pub mod window;

use air_sync_source_models::{NormalizedRecord, SensorKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::vendor::VendorDefinition;

/// Errors that can occur while fetching or normalizing vendor data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed (network error or non-2xx status).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required key is missing from the vendor payload.
    #[error("missing required key '{key}' in vendor payload")]
    Schema {
        /// The first missing key.
        key: String,
    },

    /// A record timestamp could not be parsed.
    #[error("unparseable timestamp '{value}'")]
    Timestamp {
        /// The raw timestamp text.
        value: String,
    },

    /// Payload shape violation that is not a single missing key.
    #[error("normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },
}

/// One page of normalized vendor data.
///
/// Nothing is dropped silently: records a normalizer rejects under its
/// per-vendor timestamp policy land in `rejected` so the caller can log
/// them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedPage {
    /// Records accepted by the normalizer, in vendor order.
    pub records: Vec<NormalizedRecord>,
    /// Human-readable descriptions of records dropped from this page.
    pub rejected: Vec<String>,
}

impl NormalizedPage {
    /// A page with zero rows (vendor returned an empty result set).
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            records: Vec::new(),
            rejected: Vec::new(),
        }
    }
}

/// Narrow HTTP seam: fetch one URL, fail on network or non-2xx.
///
/// Timeout and retry policy belong to the implementation, never to the
/// sync engine.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Fetches the raw response body for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] on network failure or non-2xx status.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// [`Fetch`] implementation backed by [`reqwest`].
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with a fresh connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Parses a raw response body into a JSON tree.
///
/// # Errors
///
/// Returns [`SourceError::Json`] on malformed input.
pub fn parse_payload(raw: &[u8]) -> Result<serde_json::Value, SourceError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Looks up a required key in a JSON object, naming the first missing key
/// in the error.
pub(crate) fn require_key<'a>(
    tree: &'a serde_json::Value,
    key: &str,
) -> Result<&'a serde_json::Value, SourceError> {
    tree.get(key).ok_or_else(|| SourceError::Schema {
        key: key.to_string(),
    })
}

/// Normalizes one raw page for the given vendor.
///
/// Dispatch is by the vendor definition's kind tag, resolved once at
/// channel-configuration time, not per record.
///
/// # Errors
///
/// Returns [`SourceError`] if the payload does not match the vendor's
/// shape; see the vendor modules for their per-record timestamp policies.
pub fn normalize_page(
    definition: &VendorDefinition,
    payload: &serde_json::Value,
    observed_at: DateTime<Utc>,
) -> Result<NormalizedPage, SourceError> {
    match definition.kind {
        SensorKind::Purpleair => {
            purpleair::normalize(payload, &definition.field_aliases, observed_at)
        }
        SensorKind::Thingspeak => thingspeak::normalize(payload),
        SensorKind::Atmotube => atmotube::normalize(payload),
    }
}
