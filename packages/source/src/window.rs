//! Bounded time-window pagination.
//!
//! Vendor measurement APIs cap the rows returned per call, so a catch-up
//! fetch walks half-open windows `[cursor, min(cursor + window, now))`
//! from the channel watermark up to "now". The union of the produced
//! windows covers `[last_acquisition, now)` exactly, with no gaps or
//! overlaps.

use chrono::{DateTime, Duration, Utc};

/// One half-open time range `[begin, until)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub begin: DateTime<Utc>,
    /// Exclusive upper bound.
    pub until: DateTime<Utc>,
}

/// Iterator over the windows needed to catch a channel up to `now`.
///
/// A watermark at or past `now` yields an empty iterator — the channel is
/// already caught up, which is not an error.
#[derive(Debug, Clone)]
pub struct TimeWindowIterator {
    cursor: DateTime<Utc>,
    now: DateTime<Utc>,
    window: Duration,
}

impl TimeWindowIterator {
    /// Starts paging at `last_acquisition`, in `window`-sized steps, up to
    /// `now`.
    #[must_use]
    pub const fn new(last_acquisition: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> Self {
        Self {
            cursor: last_acquisition,
            now,
            window,
        }
    }
}

impl Iterator for TimeWindowIterator {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<TimeWindow> {
        if self.cursor >= self.now {
            return None;
        }
        let until = (self.cursor + self.window).min(self.now);
        let produced = TimeWindow {
            begin: self.cursor,
            until,
        };
        self.cursor = until;
        Some(produced)
    }
}
