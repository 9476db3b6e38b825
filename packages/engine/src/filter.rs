//! Watermark deduplication filter.
//!
//! The channel watermark is the sole recovery checkpoint of the engine:
//! after any abort the next run simply re-fetches the same window, and this
//! filter keeps the overlap from turning into duplicate rows.

use air_sync_source_models::NormalizedRecord;
use chrono::{DateTime, Utc};

/// Result of filtering one page against a watermark.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// Records strictly newer than the watermark, in original order.
    pub kept: Vec<NormalizedRecord>,
    /// Maximum timestamp among kept records, or the input watermark when
    /// nothing passed.
    pub new_watermark: DateTime<Utc>,
}

/// Keeps the records strictly newer than `watermark`.
///
/// Equal timestamps count as already seen: ties favor idempotent re-runs
/// over re-ingesting a same-instant reading, and the vendors do not emit
/// two readings at an identical instant in practice. Order is preserved —
/// callers rely on processing order for diagnostics.
#[must_use]
pub fn filter_new_records(
    records: Vec<NormalizedRecord>,
    watermark: DateTime<Utc>,
) -> FilterOutcome {
    let mut kept = Vec::with_capacity(records.len());
    let mut new_watermark = watermark;

    for record in records {
        if record.timestamp > watermark {
            if record.timestamp > new_watermark {
                new_watermark = record.timestamp;
            }
            kept.push(record);
        } else {
            log::debug!("'{}' => old measure", record.timestamp);
        }
    }

    FilterOutcome {
        kept,
        new_watermark,
    }
}
