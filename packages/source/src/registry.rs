//! Vendor registry — loads all vendor definitions from embedded TOML
//! configs.
//!
//! Each `.toml` file in `packages/source/vendors/` is baked into the binary
//! at compile time via [`include_str!`]. Supporting a new vendor API means
//! adding a TOML file here plus a normalizer module.

use std::sync::LazyLock;

use air_sync_source_models::SensorKind;

use crate::vendor::{VendorDefinition, parse_vendor_toml};

/// TOML configs embedded at compile time.
const VENDOR_TOMLS: &[(&str, &str)] = &[
    ("purpleair", include_str!("../vendors/purpleair.toml")),
    ("thingspeak", include_str!("../vendors/thingspeak.toml")),
    ("atmotube", include_str!("../vendors/atmotube.toml")),
];

/// Definitions parsed once on first access; a malformed embedded TOML
/// panics here instead of producing a half-configured registry.
static VENDORS: LazyLock<Vec<VendorDefinition>> = LazyLock::new(|| {
    VENDOR_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_vendor_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
});

/// Returns all configured vendor definitions.
///
/// # Panics
///
/// Panics on first access if any embedded TOML config is malformed.
#[must_use]
pub fn all_vendors() -> Vec<VendorDefinition> {
    (*VENDORS).clone()
}

/// Returns the definition for one vendor kind.
#[must_use]
pub fn vendor_for(kind: SensorKind) -> Option<VendorDefinition> {
    VENDORS.iter().find(|v| v.kind == kind).cloned()
}
