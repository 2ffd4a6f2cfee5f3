//! Event log repository: idempotent append and per-session replay.

use rusqlite::{Connection, params};

use runlog_core::IngestEvent;

use crate::errors::Result;
use crate::sqlite::row_types::EventRow;

/// Event repository. Stateless, every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Append `event` unless `(session_id, sequence)` is already logged.
    ///
    /// Returns `true` if a row was inserted.
    pub fn append(conn: &Connection, event: &IngestEvent, received_at: i64) -> Result<bool> {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO events (session_id, request_id, sequence, timestamp, kind,
             payload, source, model, thread_id, persona_mode, user_identifier, dedupe_key,
             received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                event.session_id,
                event.request_id,
                event.sequence,
                event.timestamp,
                event.kind.as_str(),
                serde_json::to_string(&event.payload)?,
                event.source,
                event.model,
                event.thread_id,
                event.persona_mode,
                event.user_identifier,
                event.dedupe_key,
                received_at,
            ],
        )?;
        Ok(changed == 1)
    }

    /// Events of a session in sequence order, at most `limit`.
    pub fn list_by_session(conn: &Connection, session_id: &str, limit: usize) -> Result<Vec<EventRow>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM events WHERE session_id = ?1 ORDER BY sequence ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of logged events for a session, ignoring any listing limit.
    pub fn count_by_session(conn: &Connection, session_id: &str) -> Result<i64> {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of logged events.
    pub fn count_all(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
        Ok(EventRow {
            id: row.get("id")?,
            session_id: row.get("session_id")?,
            request_id: row.get("request_id")?,
            sequence: row.get("sequence")?,
            timestamp: row.get("timestamp")?,
            kind: row.get("kind")?,
            payload: row.get("payload")?,
            source: row.get("source")?,
            model: row.get("model")?,
            thread_id: row.get("thread_id")?,
            persona_mode: row.get("persona_mode")?,
            user_identifier: row.get("user_identifier")?,
            dedupe_key: row.get("dedupe_key")?,
            received_at: row.get("received_at")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
