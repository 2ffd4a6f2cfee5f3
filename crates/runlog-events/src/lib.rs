//! # runlog-events
//!
//! Event ingestion and materialized views with a `SQLite` backend.
//!
//! - **Event log**: append-only, deduplicated on `(session_id, sequence)`
//! - **Ingestion**: one immediate transaction per event; kind-specific
//!   handlers upsert the session, step and tool-call aggregates
//! - **Queries**: session listing, per-session timelines, windowed summary
//! - **Labels**: title and tag mutations over the legacy tag list
//! - **`SQLite` backend**: `r2d2` pool, embedded migrations, stateless repositories

#![deny(unsafe_code)]

pub mod errors;
pub mod ingest;
pub mod query;
pub mod sqlite;
pub mod store;
pub mod tags;

pub use errors::{EventStoreError, Result};
pub use ingest::IngestOutcome;
pub use query::{SessionSummary, SessionTimeline, UsageSummary};
pub use sqlite::connection::ConnectionConfig;
pub use sqlite::row_types::EventRow;
pub use store::{Clock, EventStore, StoreHealth};
pub use tags::{TagRejection, TagUpdate};
