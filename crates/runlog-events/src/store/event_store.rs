//! High-level `EventStore` API.
//!
//! Every write runs in its own `BEGIN IMMEDIATE` transaction, so concurrent
//! writers serialize on the database lock (bounded by `busy_timeout`) and
//! callers never observe a half-applied event.

use rusqlite::{Transaction, TransactionBehavior};
use serde::Serialize;

use runlog_core::IngestEvent;

use crate::errors::Result;
use crate::ingest::{self, IngestOutcome};
use crate::query::{self, SessionSummary, SessionTimeline, UsageSummary};
use crate::sqlite::connection::{
    self, ConnectionConfig, ConnectionPool, PooledConnection, PragmaState,
};
use crate::sqlite::migrations::{current_version, latest_version, run_migrations};
use crate::sqlite::repositories::{EventRepo, SessionRepo};
use crate::tags::{self, TagUpdate};

/// Source of "now" in epoch milliseconds.
pub type Clock = fn() -> i64;

/// Database state reported by [`EventStore::health`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    /// Pragmas read back from a pooled connection.
    pub pragmas: PragmaState,
    /// Highest applied migration.
    pub schema_version: u32,
    /// Highest migration this build knows.
    pub latest_schema_version: u32,
    /// Session rows.
    pub sessions: i64,
    /// Logged events.
    pub events: i64,
}

impl StoreHealth {
    /// Foreign keys on and the schema fully migrated.
    pub fn is_healthy(&self) -> bool {
        self.pragmas.foreign_keys_enabled && self.schema_version == self.latest_schema_version
    }
}

/// Shareable handle over the connection pool. `Send + Sync`.
pub struct EventStore {
    pool: ConnectionPool,
    clock: Clock,
}

impl EventStore {
    /// Wrap an already-migrated pool.
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            clock: runlog_core::now_ms,
        }
    }

    /// Open (creating if needed) a database file and apply pending migrations.
    pub fn open_file(path: &str, config: &ConnectionConfig) -> Result<Self> {
        let pool = connection::new_file(path, config)?;
        Self::migrated(pool)
    }

    /// Fresh in-memory database with the schema applied.
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::migrated(pool)
    }

    /// Replace the clock used for `created_at`/`updated_at` and summary windows.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn migrated(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self::new(pool))
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    fn now(&self) -> i64 {
        (self.clock)()
    }

    /// Run `f` inside one immediate transaction, committing on success.
    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>, i64) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx, self.now())?;
        tx.commit()?;
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Ingestion
    // ─────────────────────────────────────────────────────────────────────

    /// Append `event` (idempotently) and update every aggregate it touches.
    pub fn ingest_event(&self, event: &IngestEvent) -> Result<IngestOutcome> {
        self.write(|tx, now| ingest::ingest(tx, event, now))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Newest sessions first; `limit` defaults to 25, clamped to 1..=200.
    pub fn list_sessions(&self, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
        let conn = self.conn()?;
        query::list_sessions(&conn, limit)
    }

    /// Session with its steps, tool calls and raw events; `None` if unknown.
    pub fn get_session_timeline(&self, session_id: &str) -> Result<Option<SessionTimeline>> {
        let conn = self.conn()?;
        query::get_session_timeline(&conn, session_id)
    }

    /// Rollup over recent sessions, optionally limited to the last `window_ms`.
    pub fn get_summary(&self, window_ms: Option<i64>) -> Result<UsageSummary> {
        let conn = self.conn()?;
        query::get_summary(&conn, window_ms, self.now())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Labels
    // ─────────────────────────────────────────────────────────────────────

    /// Set or clear the session title.
    pub fn set_session_tag(
        &self,
        session_id: &str,
        title: Option<&str>,
    ) -> Result<TagUpdate<Option<String>>> {
        self.write(|tx, now| tags::set_session_tag(tx, session_id, title, now))
    }

    /// Add a tag (case-insensitive no-op if present).
    pub fn add_session_tag(&self, session_id: &str, tag: &str) -> Result<TagUpdate<Vec<String>>> {
        self.write(|tx, now| tags::add_session_tag(tx, session_id, tag, now))
    }

    /// Remove a tag (case-insensitive match).
    pub fn remove_session_tag(
        &self,
        session_id: &str,
        tag: &str,
    ) -> Result<TagUpdate<Vec<String>>> {
        self.write(|tx, now| tags::remove_session_tag(tx, session_id, tag, now))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Diagnostics
    // ─────────────────────────────────────────────────────────────────────

    /// Pragmas, schema version and row counts.
    pub fn health(&self) -> Result<StoreHealth> {
        let conn = self.conn()?;
        Ok(StoreHealth {
            pragmas: connection::verify_pragmas(&conn)?,
            schema_version: current_version(&conn)?,
            latest_schema_version: latest_version(),
            sessions: SessionRepo::count_all(&conn)?,
            events: EventRepo::count_all(&conn)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use runlog_core::EventKind;
    use serde_json::json;

    fn fixed_clock() -> i64 {
        5_000
    }

    fn setup() -> EventStore {
        EventStore::in_memory().unwrap().with_clock(fixed_clock)
    }

    #[test]
    fn store_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<EventStore>();
    }

    #[test]
    fn ingest_then_list() {
        let store = setup();
        let event = IngestEvent::new("s1", "r1", 1, 100, EventKind::SessionStarted)
            .with_payload(json!({"model": "m"}));
        let out = store.ingest_event(&event).unwrap();
        assert!(out.ok && out.appended);

        let sessions = store.list_sessions(None).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session.created_at, 5_000);
        assert_eq!(sessions[0].session.model.as_deref(), Some("m"));
    }

    #[test]
    fn tags_through_store() {
        let store = setup();
        store
            .ingest_event(&IngestEvent::new("s1", "r1", 1, 100, EventKind::SessionStarted))
            .unwrap();
        store.set_session_tag("s1", Some("Demo")).unwrap();
        store.add_session_tag("s1", "x").unwrap();

        let timeline = store.get_session_timeline("s1").unwrap().unwrap();
        assert_eq!(timeline.session.title.as_deref(), Some("Demo"));
        assert_eq!(timeline.session.tags, vec!["x"]);
        assert_eq!(timeline.events.len(), 1);
    }

    #[test]
    fn summary_uses_injected_clock() {
        let store = setup();
        let summary = store.get_summary(Some(1_000)).unwrap();
        assert_eq!(summary.generated_at, 5_000);
    }

    #[test]
    fn health_reports_schema_and_counts() {
        let store = setup();
        store
            .ingest_event(&IngestEvent::new("s1", "r1", 1, 100, EventKind::SessionStarted))
            .unwrap();
        let health = store.health().unwrap();
        assert!(health.is_healthy());
        assert_eq!(health.schema_version, latest_version());
        assert_eq!(health.sessions, 1);
        assert_eq!(health.events, 1);
    }

    #[test]
    fn open_file_migrates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.db");
        let path = path.to_str().unwrap();
        {
            let store = EventStore::open_file(path, &ConnectionConfig::default()).unwrap();
            store
                .ingest_event(&IngestEvent::new("s1", "r1", 1, 100, EventKind::SessionStarted))
                .unwrap();
        }
        let reopened = EventStore::open_file(path, &ConnectionConfig::default()).unwrap();
        assert_eq!(reopened.list_sessions(None).unwrap().len(), 1);
        assert_eq!(reopened.health().unwrap().pragmas.journal_mode, "wal");
    }
}
