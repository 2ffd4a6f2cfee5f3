//! Session repository: the per-session aggregate row.
//!
//! Handlers load a [`Session`], mutate it in memory and write the whole row
//! back with [`SessionRepo::save`].

use rusqlite::{Connection, OptionalExtension, params};

use runlog_core::Session;

use crate::errors::Result;
use crate::sqlite::row_types::{json_column, to_json_text};

/// Session repository. Stateless, every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Session by ID.
    pub fn get(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
        let row = conn
            .query_row(
                "SELECT * FROM sessions WHERE session_id = ?1",
                params![session_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Session most recently updated under `request_id`.
    pub fn find_by_request_id(conn: &Connection, request_id: &str) -> Result<Option<Session>> {
        let row = conn
            .query_row(
                "SELECT * FROM sessions WHERE request_id = ?1
                 ORDER BY updated_at DESC, session_id ASC LIMIT 1",
                params![request_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Session an alias id points at.
    pub fn alias_target(conn: &Connection, alias_id: &str) -> Result<Option<String>> {
        let target = conn
            .query_row(
                "SELECT session_id FROM session_aliases WHERE alias_id = ?1",
                params![alias_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(target)
    }

    /// Record `alias_id` as another name for `session_id`. Existing aliases
    /// are kept.
    pub fn add_alias(
        conn: &Connection,
        alias_id: &str,
        session_id: &str,
        request_id: &str,
        now: i64,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT OR IGNORE INTO session_aliases (alias_id, session_id, request_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![alias_id, session_id, request_id, now],
        )?;
        Ok(())
    }

    /// Aliases of `session_id`, oldest first.
    pub fn list_aliases(conn: &Connection, session_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT alias_id FROM session_aliases WHERE session_id = ?1
             ORDER BY created_at ASC, alias_id ASC",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
    }

    /// Stored session id for `id`, following an alias. `None` if neither a
    /// session nor an alias.
    pub fn canonical_id(conn: &Connection, id: &str) -> Result<Option<String>> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE session_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(Some(id.to_string()));
        }
        Self::alias_target(conn, id)
    }

    /// Insert a new session row.
    pub fn insert(conn: &Connection, session: &Session) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO sessions (session_id, request_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.session_id,
                session.request_id,
                session.created_at,
                session.updated_at,
            ],
        )?;
        Self::save(conn, session)
    }

    /// Overwrite every mutable column of an existing row.
    ///
    /// `created_at` is never rewritten.
    pub fn save(conn: &Connection, s: &Session) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sessions SET
               request_id = ?2, source = ?3, model = ?4, thread_id = ?5, persona_mode = ?6,
               user_identifier = ?7, step_count = ?8, tool_call_count = ?9,
               estimated_usage = ?10, actual_usage = ?11,
               estimated_cost_usd = ?12, actual_cost_usd = ?13,
               session_started_at = ?14, session_finished_at = ?15,
               first_event_at = ?16, last_event_at = ?17,
               first_user_message_at = ?18, last_assistant_message_at = ?19,
               end_to_end_started_at = ?20, end_to_end_finished_at = ?21,
               end_to_end_duration_ms = ?22, tool_names = ?23, attachment_count = ?24,
               last_user_message_preview = ?25, last_assistant_message_preview = ?26,
               tags = ?27, updated_at = ?28, last_user_message_at = ?29
             WHERE session_id = ?1",
            params![
                s.session_id,
                s.request_id,
                s.source,
                s.model,
                s.thread_id,
                s.persona_mode,
                s.user_identifier,
                s.step_count,
                s.tool_call_count,
                to_json_text(s.estimated_usage.as_ref())?,
                to_json_text(s.actual_usage.as_ref())?,
                s.estimated_cost_usd,
                s.actual_cost_usd,
                s.session_started_at,
                s.session_finished_at,
                s.first_event_at,
                s.last_event_at,
                s.first_user_message_at,
                s.last_assistant_message_at,
                s.end_to_end_started_at,
                s.end_to_end_finished_at,
                s.end_to_end_duration_ms,
                to_json_text(s.tool_names.as_ref())?,
                s.attachment_count,
                s.last_user_message_preview,
                s.last_assistant_message_preview,
                to_json_text(s.tags.as_ref())?,
                s.updated_at,
                s.last_user_message_at,
            ],
        )?;
        Ok(())
    }

    /// Most recently created sessions first, at most `limit`.
    pub fn list_recent(conn: &Connection, limit: usize) -> Result<Vec<Session>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM sessions ORDER BY created_at DESC, session_id ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of session rows (aliases excluded).
    pub fn count_all(conn: &Connection) -> Result<i64> {
        let count = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Raw tag storage. Outer `None` means the session does not exist.
    pub fn get_tags(conn: &Connection, session_id: &str) -> Result<Option<Option<Vec<String>>>> {
        let tags = conn
            .query_row(
                "SELECT tags FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| json_column(row, "tags"),
            )
            .optional()?;
        Ok(tags)
    }

    /// Replace the raw tag storage and bump `updated_at`.
    pub fn set_tags(
        conn: &Connection,
        session_id: &str,
        tags: Option<&[String]>,
        now: i64,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET tags = ?2, updated_at = ?3 WHERE session_id = ?1",
            params![session_id, to_json_text(tags)?, now],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
        Ok(Session {
            session_id: row.get("session_id")?,
            request_id: row.get("request_id")?,
            source: row.get("source")?,
            model: row.get("model")?,
            thread_id: row.get("thread_id")?,
            persona_mode: row.get("persona_mode")?,
            user_identifier: row.get("user_identifier")?,
            step_count: row.get("step_count")?,
            tool_call_count: row.get("tool_call_count")?,
            estimated_usage: json_column(row, "estimated_usage")?,
            actual_usage: json_column(row, "actual_usage")?,
            estimated_cost_usd: row.get("estimated_cost_usd")?,
            actual_cost_usd: row.get("actual_cost_usd")?,
            session_started_at: row.get("session_started_at")?,
            session_finished_at: row.get("session_finished_at")?,
            first_event_at: row.get("first_event_at")?,
            last_event_at: row.get("last_event_at")?,
            first_user_message_at: row.get("first_user_message_at")?,
            last_user_message_at: row.get("last_user_message_at")?,
            last_assistant_message_at: row.get("last_assistant_message_at")?,
            end_to_end_started_at: row.get("end_to_end_started_at")?,
            end_to_end_finished_at: row.get("end_to_end_finished_at")?,
            end_to_end_duration_ms: row.get("end_to_end_duration_ms")?,
            tool_names: json_column(row, "tool_names")?,
            attachment_count: row.get("attachment_count")?,
            last_user_message_preview: row.get("last_user_message_preview")?,
            last_assistant_message_preview: row.get("last_assistant_message_preview")?,
            tags: json_column(row, "tags")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
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
    use crate::sqlite::migrations::run_migrations;
    use runlog_core::Usage;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn insert_and_get() {
        let conn = setup();
        let mut session = Session::new("s1", "r1", 100);
        session.model = Some("m".into());
        session.last_user_message_at = Some(42);
        session.estimated_usage = Some(Usage {
            total_tokens: Some(12.0),
            ..Usage::default()
        });
        SessionRepo::insert(&conn, &session).unwrap();

        let loaded = SessionRepo::get(&conn, "s1").unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn get_missing_is_none() {
        let conn = setup();
        assert!(SessionRepo::get(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn save_never_rewrites_created_at() {
        let conn = setup();
        let session = Session::new("s1", "r1", 100);
        SessionRepo::insert(&conn, &session).unwrap();

        let mut changed = session.clone();
        changed.created_at = 999;
        changed.step_count = 3;
        changed.updated_at = 200;
        SessionRepo::save(&conn, &changed).unwrap();

        let loaded = SessionRepo::get(&conn, "s1").unwrap().unwrap();
        assert_eq!(loaded.created_at, 100);
        assert_eq!(loaded.step_count, 3);
        assert_eq!(loaded.updated_at, 200);
    }

    #[test]
    fn list_recent_newest_first() {
        let conn = setup();
        for (id, at) in [("a", 1), ("b", 3), ("c", 2)] {
            SessionRepo::insert(&conn, &Session::new(id, "r", at)).unwrap();
        }
        let ids: Vec<String> = SessionRepo::list_recent(&conn, 2)
            .unwrap()
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(SessionRepo::count_all(&conn).unwrap(), 3);
    }

    #[test]
    fn tags_storage() {
        let conn = setup();
        assert_eq!(SessionRepo::get_tags(&conn, "s1").unwrap(), None);

        SessionRepo::insert(&conn, &Session::new("s1", "r", 0)).unwrap();
        assert_eq!(SessionRepo::get_tags(&conn, "s1").unwrap(), Some(None));

        let tags = vec!["tag:x".to_string()];
        assert!(SessionRepo::set_tags(&conn, "s1", Some(tags.as_slice()), 5).unwrap());
        assert_eq!(SessionRepo::get_tags(&conn, "s1").unwrap(), Some(Some(tags)));

        SessionRepo::set_tags(&conn, "s1", None, 6).unwrap();
        let raw: Option<String> = conn
            .query_row("SELECT tags FROM sessions WHERE session_id = 's1'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(raw, None);
    }

    #[test]
    fn request_lookup_prefers_latest_update() {
        let conn = setup();
        let mut older = Session::new("a", "req", 1);
        older.updated_at = 10;
        SessionRepo::insert(&conn, &older).unwrap();
        let mut newer = Session::new("b", "req", 2);
        newer.updated_at = 20;
        SessionRepo::insert(&conn, &newer).unwrap();

        let found = SessionRepo::find_by_request_id(&conn, "req").unwrap().unwrap();
        assert_eq!(found.session_id, "b");
        assert!(SessionRepo::find_by_request_id(&conn, "other").unwrap().is_none());
    }

    #[test]
    fn aliases_resolve_to_their_session() {
        let conn = setup();
        SessionRepo::insert(&conn, &Session::new("s1", "req", 0)).unwrap();
        SessionRepo::add_alias(&conn, "s2", "s1", "req", 5).unwrap();
        SessionRepo::add_alias(&conn, "s2", "s1", "req", 6).unwrap();

        assert_eq!(SessionRepo::canonical_id(&conn, "s1").unwrap().as_deref(), Some("s1"));
        assert_eq!(SessionRepo::canonical_id(&conn, "s2").unwrap().as_deref(), Some("s1"));
        assert_eq!(SessionRepo::canonical_id(&conn, "s3").unwrap(), None);
        assert_eq!(SessionRepo::list_aliases(&conn, "s1").unwrap(), vec!["s2"]);
    }
}
