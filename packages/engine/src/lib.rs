#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! The incremental synchronization engine.
//!
//! Pure with respect to the store: [`sync::sync_channel`] turns a channel's
//! pending vendor pages into batch rows and a new watermark, and the caller
//! owns the single write and the watermark update that follow.

pub mod filter;
pub mod records;
pub mod sync;

pub use filter::{FilterOutcome, filter_new_records};
pub use records::build_rows;
pub use sync::{SyncOutcome, sync_channel};
