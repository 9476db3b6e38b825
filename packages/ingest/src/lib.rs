#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Orchestration for the sync and registration runs.
//!
//! [`sync_kind`] catches every channel of one vendor kind up to now, one
//! channel at a time over a single store connection; [`register_purpleair`]
//! discovers new sensors from the `PurpleAir` registry snapshot, and
//! [`update_purpleair_locations`] keeps their location history current.

use air_sync_database::queries::{self, NewSensor};
use air_sync_database::{Database, DbError};
use air_sync_engine::sync::sync_channel;
use air_sync_source::registry::vendor_for;
use air_sync_source::vendor::VendorDefinition;
use air_sync_source::{Fetch, SourceError, normalize_page, parse_payload};
use air_sync_source_models::{Channel, NormalizedRecord, ParameterCatalog, SensorKind};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("configuration error: {message}")]
    Config { message: String },
}

/// What a [`sync_kind`] run did, for the CLI to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Channels attempted.
    pub channels: usize,
    /// Channels that completed, including ones with nothing new.
    pub synced: usize,
    /// Channels that aborted; their watermarks were left untouched.
    pub failed: usize,
    /// Measurement rows written across all channels.
    pub rows_written: usize,
}

/// What an [`update_purpleair_locations`] run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationUpdateSummary {
    /// Sensors present in the registry snapshot.
    pub discovered: usize,
    /// Sensors whose open location row was closed and replaced.
    pub moved: usize,
    /// Sensors still at their stored location.
    pub unchanged: usize,
    /// Snapshot rows without a registered counterpart, a name, or a fix.
    pub skipped: usize,
}

/// What a [`register_purpleair`] run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSummary {
    /// Sensors present in the registry snapshot.
    pub discovered: usize,
    /// Sensors newly registered.
    pub registered: usize,
    /// Sensors skipped because their name is already known.
    pub skipped: usize,
    /// Snapshot rows missing a name or channel credential.
    pub malformed: usize,
}

/// Syncs every channel of one vendor kind.
///
/// Channels are processed sequentially; a failing channel is logged and
/// skipped without touching its watermark, and never blocks the channels
/// after it.
///
/// # Errors
///
/// Returns [`IngestError`] when the vendor has no time-series definition
/// or the initial catalog/channel queries fail. Per-channel failures are
/// absorbed into the summary instead.
pub async fn sync_kind(
    db: &dyn Database,
    fetcher: &dyn Fetch,
    kind: SensorKind,
    now: DateTime<Utc>,
) -> Result<SyncSummary, IngestError> {
    let vendor = vendor_for(kind).ok_or_else(|| IngestError::Config {
        message: format!("no vendor definition for '{kind}'"),
    })?;
    let table = vendor
        .measure_table
        .clone()
        .ok_or_else(|| IngestError::Config {
            message: format!("vendor '{kind}' is not a time-series source"),
        })?;

    let catalog = queries::parameter_catalog_for(db, kind).await?;
    if catalog.is_empty() {
        return Err(IngestError::Config {
            message: format!("empty parameter catalog for '{kind}'"),
        });
    }
    let channels = queries::channels(db, kind).await?;
    log::info!("syncing {} '{kind}' channel(s)", channels.len());

    let mut summary = SyncSummary {
        channels: channels.len(),
        ..SyncSummary::default()
    };
    for channel in &channels {
        match sync_one_channel(db, fetcher, &vendor, &table, &catalog, channel, now).await {
            Ok(rows_written) => {
                summary.synced += 1;
                summary.rows_written += rows_written;
            }
            Err(e) => {
                summary.failed += 1;
                log::error!(
                    "{}/{}: sync failed, watermark untouched: {e}",
                    channel.sensor_id,
                    channel.channel_name
                );
            }
        }
    }

    log::info!(
        "'{kind}' sync complete: {}/{} channel(s), {} row(s) written",
        summary.synced,
        summary.channels,
        summary.rows_written
    );
    Ok(summary)
}

/// One channel's fetch-to-write cycle: exactly one batched insert and one
/// watermark update, in that order, and only when something new arrived.
async fn sync_one_channel(
    db: &dyn Database,
    fetcher: &dyn Fetch,
    vendor: &VendorDefinition,
    table: &str,
    catalog: &ParameterCatalog,
    channel: &Channel,
    now: DateTime<Utc>,
) -> Result<usize, IngestError> {
    let start_packet_id = queries::max_packet_id(db, table).await? + 1;
    let outcome = sync_channel(fetcher, vendor, channel, catalog, start_packet_id, now).await?;

    for description in &outcome.rejected {
        log::warn!(
            "{}/{}: dropped record: {description}",
            channel.sensor_id,
            channel.channel_name
        );
    }

    if outcome.rows.is_empty() {
        log::info!(
            "{}/{}: up to date ({} page(s) checked)",
            channel.sensor_id,
            channel.channel_name,
            outcome.pages
        );
        return Ok(0);
    }

    queries::insert_measurements(db, table, vendor.kind.is_mobile(), &outcome.rows).await?;
    queries::update_last_acquisition(
        db,
        channel.sensor_id,
        &channel.channel_name,
        outcome.new_watermark,
    )
    .await?;

    log::info!(
        "{}/{}: wrote {} row(s) over {} page(s), watermark now {}",
        channel.sensor_id,
        channel.channel_name,
        outcome.rows.len(),
        outcome.pages,
        outcome.new_watermark
    );
    Ok(outcome.rows.len())
}

/// The four ThingSpeak channels every `PurpleAir` station publishes
/// through, with the snapshot columns carrying their credentials.
const CHANNEL_CREDENTIALS: [(&str, &str, &str); 4] = [
    ("1A", "primary_key_a", "primary_id_a"),
    ("1B", "primary_key_b", "primary_id_b"),
    ("2A", "secondary_key_a", "secondary_id_a"),
    ("2B", "secondary_key_b", "secondary_id_b"),
];

/// Registers sensors found in the `PurpleAir` registry that the store does
/// not know yet.
///
/// Known sensors are matched by display name (`"{name} ({sensor_index})"`).
/// Each new sensor gets its four ThingSpeak channels, all watermarked at
/// `now`, plus a location row when the snapshot carries coordinates.
///
/// # Errors
///
/// Returns [`IngestError`] when the snapshot fetch, its normalization, or
/// a store operation fails.
pub async fn register_purpleair(
    db: &dyn Database,
    fetcher: &dyn Fetch,
    api_key: &str,
    now: DateTime<Utc>,
) -> Result<RegisterSummary, IngestError> {
    let page = registry_snapshot(fetcher, api_key, now).await?;

    let known = queries::existing_sensor_names(db, SensorKind::Purpleair).await?;
    let mut sensor_id = queries::next_sensor_id(db).await?;

    let mut summary = RegisterSummary {
        discovered: page.records.len(),
        ..RegisterSummary::default()
    };
    let mut sensors = Vec::new();
    for (index, record) in page.records.iter().enumerate() {
        let Some(sensor) = new_sensor_from_record(record, sensor_id, now) else {
            summary.malformed += 1;
            log::warn!("registry row {index} is missing a name or channel credential");
            continue;
        };
        if known.iter().any(|name| *name == sensor.name) {
            summary.skipped += 1;
            continue;
        }
        log::info!("registering '{}' as sensor {sensor_id}", sensor.name);
        sensor_id += 1;
        sensors.push(sensor);
    }

    queries::insert_sensors(db, SensorKind::Purpleair, &sensors, now).await?;
    summary.registered = sensors.len();

    log::info!(
        "registration complete: {} discovered, {} new, {} known, {} malformed",
        summary.discovered,
        summary.registered,
        summary.skipped,
        summary.malformed
    );
    Ok(summary)
}

/// Moves the open location row of every registered sensor that the
/// registry snapshot reports at a different point.
///
/// A moved sensor gets its open `sensor_at_location` row closed at `now`
/// and a new open row at the reported point; an unmoved sensor is left
/// alone. Snapshot rows for unregistered sensors, or without a name or a
/// fix, are skipped — registration is [`register_purpleair`]'s job.
///
/// # Errors
///
/// Returns [`IngestError`] when the snapshot fetch, its normalization, or
/// a store operation fails.
pub async fn update_purpleair_locations(
    db: &dyn Database,
    fetcher: &dyn Fetch,
    api_key: &str,
    now: DateTime<Utc>,
) -> Result<LocationUpdateSummary, IngestError> {
    let page = registry_snapshot(fetcher, api_key, now).await?;
    let stored = queries::active_locations(db, SensorKind::Purpleair).await?;

    let mut summary = LocationUpdateSummary {
        discovered: page.records.len(),
        ..LocationUpdateSummary::default()
    };
    for record in &page.records {
        let (Some(name), Some(index), Some(reported)) = (
            param(record, "name"),
            param(record, "sensor_index"),
            record.geolocation,
        ) else {
            summary.skipped += 1;
            continue;
        };
        let display_name = format!("{name} ({index})");
        let Some(current) = stored.iter().find(|l| l.name == display_name) else {
            summary.skipped += 1;
            continue;
        };

        // Points are compared through their rendered geometry so the
        // stored and reported coordinates go through the same formatting.
        if current.location.geometry_expr() == reported.geometry_expr() {
            summary.unchanged += 1;
            continue;
        }

        log::info!(
            "'{display_name}' moved: {} -> {}",
            current.location.geometry_expr(),
            reported.geometry_expr()
        );
        queries::update_sensor_location(db, current.sensor_id, &reported, now).await?;
        summary.moved += 1;
    }

    log::info!(
        "location update complete: {} discovered, {} moved, {} unchanged, {} skipped",
        summary.discovered,
        summary.moved,
        summary.unchanged,
        summary.skipped
    );
    Ok(summary)
}

/// Fetches and normalizes one registry snapshot.
async fn registry_snapshot(
    fetcher: &dyn Fetch,
    api_key: &str,
    now: DateTime<Utc>,
) -> Result<air_sync_source::NormalizedPage, IngestError> {
    let vendor = vendor_for(SensorKind::Purpleair).ok_or_else(|| IngestError::Config {
        message: "no vendor definition for 'purpleair'".to_string(),
    })?;

    let raw = fetcher.fetch(&vendor.snapshot_url(api_key)).await?;
    let payload = parse_payload(&raw)?;
    Ok(normalize_page(&vendor, &payload, now)?)
}

fn new_sensor_from_record(
    record: &NormalizedRecord,
    sensor_id: i32,
    registered_at: DateTime<Utc>,
) -> Option<NewSensor> {
    let name = param(record, "name")?;
    let index = param(record, "sensor_index")?;

    let mut channels = Vec::with_capacity(CHANNEL_CREDENTIALS.len());
    for (channel_name, key_column, id_column) in CHANNEL_CREDENTIALS {
        channels.push(Channel {
            sensor_id,
            channel_name: channel_name.to_string(),
            api_key: param(record, key_column)?.to_string(),
            api_id: param(record, id_column)?.to_string(),
            last_acquisition: registered_at,
        });
    }

    Some(NewSensor {
        sensor_id,
        name: format!("{name} ({index})"),
        channels,
        location: record.geolocation,
    })
}

fn param<'a>(record: &'a NormalizedRecord, name: &str) -> Option<&'a str> {
    record
        .parameters
        .iter()
        .find(|(candidate, _)| candidate == name)
        .and_then(|(_, value)| value.as_deref())
}
