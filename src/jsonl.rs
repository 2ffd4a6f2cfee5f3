//! JSON Lines event feed.

use std::io::BufRead;

use anyhow::{Context, Result};
use runlog_core::IngestEvent;
use runlog_events::EventStore;
use serde::Serialize;
use tracing::warn;

/// Counts reported after feeding a stream into the store.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedReport {
    /// Events newly appended to the log.
    pub appended: usize,
    /// Events already present under the same session and sequence.
    pub duplicates: usize,
    /// Lines that were not a valid event.
    pub skipped: usize,
}

/// Ingest every line of `reader` as one event. Blank lines are ignored and
/// malformed lines are skipped with a warning naming the line number.
pub fn feed(store: &EventStore, reader: impl BufRead) -> Result<FeedReport> {
    let mut report = FeedReport::default();
    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("reading line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: IngestEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(error) => {
                warn!(line = line_no, %error, "skipping malformed event");
                report.skipped += 1;
                continue;
            }
        };
        let outcome = store
            .ingest_event(&event)
            .with_context(|| format!("ingesting line {line_no}"))?;
        if outcome.appended {
            report.appended += 1;
        } else {
            report.duplicates += 1;
        }
    }
    Ok(report)
}
