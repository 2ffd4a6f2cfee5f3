//! # runlog-core
//!
//! Domain model and pure aggregation logic for the runlog telemetry engine.
//!
//! Nothing in this crate performs I/O. It provides:
//!
//! - **Events**: the [`IngestEvent`] envelope and the closed [`EventKind`] set
//! - **Payloads**: one typed parser per kind that degrades garbled fields to defaults
//! - **Usage**: sparse token-usage maps and the category-wise merge
//! - **Labels**: the title/tag codec over the legacy single-list storage format
//! - **Timing**: end-to-end duration derivation from competing timestamp signals
//! - **Merge**: named field merge policies used by the aggregate upserts
//! - **Aggregates**: the `Session`, `Step` and `ToolCall` materialized records

#![deny(unsafe_code)]

pub mod aggregate;
pub mod event;
pub mod labels;
pub mod merge;
pub mod payload;
pub mod timing;
pub mod usage;

pub use aggregate::{Session, Step, ToolCall, ToolCallStatus};
pub use event::{EventKind, IngestEvent};
pub use labels::SessionLabels;
pub use merge::{Accumulate, Merge};
pub use payload::EventPayload;
pub use timing::{DerivedTiming, TimingSignals};
pub use usage::Usage;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Round `value` to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
