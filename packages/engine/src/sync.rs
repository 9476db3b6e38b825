//! Channel synchronization: the fetch → normalize → filter → build loop.

use air_sync_source::vendor::VendorDefinition;
use air_sync_source::window::TimeWindowIterator;
use air_sync_source::{Fetch, SourceError, normalize_page, parse_payload};
use air_sync_source_models::{BatchRow, Channel, ParameterCatalog};
use chrono::{DateTime, Utc};

use crate::filter::filter_new_records;
use crate::records::build_rows;

/// Everything one channel sync run produced.
///
/// The caller turns `rows` into exactly one batched write and, only after
/// that write succeeds, persists `new_watermark`. If nothing here gets
/// persisted the next run covers the same windows again and the filter
/// drops the repeats.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Insert-ready rows across all pages of the run.
    pub rows: Vec<BatchRow>,
    /// Watermark to persist after the write; equals the channel's stored
    /// watermark when no new record was found.
    pub new_watermark: DateTime<Utc>,
    /// Number of pages fetched.
    pub pages: usize,
    /// Rejected-record descriptions collected from all pages, for the
    /// caller to log.
    pub rejected: Vec<String>,
}

/// Catches one channel up from its watermark to `now`.
///
/// Drives the vendor's time-window sequence to exhaustion; each page is
/// fetched, parsed, normalized, filtered against the running watermark
/// (stored watermark first, then the maximum accepted so far, so
/// window-boundary overlap cannot re-admit a record), and expanded into
/// batch rows with contiguous packet ids from `start_packet_id`.
///
/// Pure with respect to the store: no write happens here, and re-running
/// with the same inputs yields the same rows.
///
/// # Errors
///
/// Returns the first [`SourceError`] encountered; the caller must then
/// leave the stored watermark untouched so the next run resumes from the
/// same point.
pub async fn sync_channel(
    fetcher: &dyn Fetch,
    vendor: &VendorDefinition,
    channel: &Channel,
    catalog: &ParameterCatalog,
    start_packet_id: i64,
    now: DateTime<Utc>,
) -> Result<SyncOutcome, SourceError> {
    let window = vendor.window().ok_or_else(|| SourceError::Normalization {
        message: format!("vendor '{}' is not a time-series source", vendor.kind),
    })?;

    let mut rows: Vec<BatchRow> = Vec::new();
    let mut rejected = Vec::new();
    let mut watermark = channel.last_acquisition;
    let mut pages = 0;

    for time_window in TimeWindowIterator::new(channel.last_acquisition, window, now) {
        let url = vendor.request_url(channel, &time_window);
        log::debug!(
            "{}/{}: fetching [{} .. {})",
            channel.sensor_id,
            channel.channel_name,
            time_window.begin,
            time_window.until
        );

        let raw = fetcher.fetch(&url).await?;
        let payload = parse_payload(&raw)?;
        let page = normalize_page(vendor, &payload, now)?;
        pages += 1;
        rejected.extend(page.rejected);

        if page.records.is_empty() {
            log::info!(
                "{}/{}: empty API answer",
                channel.sensor_id,
                channel.channel_name
            );
            continue;
        }

        let outcome = filter_new_records(page.records, watermark);
        if outcome.kept.is_empty() {
            log::info!(
                "{}/{}: no new measurements",
                channel.sensor_id,
                channel.channel_name
            );
            continue;
        }
        watermark = outcome.new_watermark;

        let next_packet_id = rows.last().map_or(start_packet_id, |row| row.packet_id + 1);
        rows.extend(build_rows(
            &outcome.kept,
            catalog,
            next_packet_id,
            channel.sensor_id,
        ));
    }

    Ok(SyncOutcome {
        rows,
        new_watermark: watermark,
        pages,
        rejected,
    })
}
