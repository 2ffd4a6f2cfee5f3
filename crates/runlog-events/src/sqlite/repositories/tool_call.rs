//! Tool call repository, keyed by `(session_id, tool_call_id)`.

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, params};

use runlog_core::{ToolCall, ToolCallStatus};

use crate::errors::Result;
use crate::sqlite::row_types::{json_column, to_json_text};

/// Tool call repository. Stateless, every method takes `&Connection`.
pub struct ToolCallRepo;

impl ToolCallRepo {
    /// Tool call by natural key.
    pub fn get(conn: &Connection, session_id: &str, tool_call_id: &str) -> Result<Option<ToolCall>> {
        let row = conn
            .query_row(
                "SELECT * FROM tool_calls WHERE session_id = ?1 AND tool_call_id = ?2",
                params![session_id, tool_call_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert or overwrite a tool call. An existing row keeps its `created_at`.
    pub fn upsert(conn: &Connection, call: &ToolCall) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO tool_calls (session_id, tool_call_id, tool_name, step_index, status,
             started_at, completed_at, duration_ms, input_summary, result_summary, token_usage,
             cost_usd, is_error, outbound_payload, outbound_sequence, outbound_at,
             inbound_payload, inbound_sequence, inbound_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21)
             ON CONFLICT (session_id, tool_call_id) DO UPDATE SET
               tool_name = excluded.tool_name,
               step_index = excluded.step_index,
               status = excluded.status,
               started_at = excluded.started_at,
               completed_at = excluded.completed_at,
               duration_ms = excluded.duration_ms,
               input_summary = excluded.input_summary,
               result_summary = excluded.result_summary,
               token_usage = excluded.token_usage,
               cost_usd = excluded.cost_usd,
               is_error = excluded.is_error,
               outbound_payload = excluded.outbound_payload,
               outbound_sequence = excluded.outbound_sequence,
               outbound_at = excluded.outbound_at,
               inbound_payload = excluded.inbound_payload,
               inbound_sequence = excluded.inbound_sequence,
               inbound_at = excluded.inbound_at,
               updated_at = excluded.updated_at",
            params![
                call.session_id,
                call.tool_call_id,
                call.tool_name,
                call.step_index,
                call.status.as_str(),
                call.started_at,
                call.completed_at,
                call.duration_ms,
                to_json_text(call.input_summary.as_ref())?,
                to_json_text(call.result_summary.as_ref())?,
                to_json_text(call.token_usage.as_ref())?,
                call.cost_usd,
                call.is_error,
                to_json_text(call.outbound_payload.as_ref())?,
                call.outbound_sequence,
                call.outbound_at,
                to_json_text(call.inbound_payload.as_ref())?,
                call.inbound_sequence,
                call.inbound_at,
                call.created_at,
                call.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Tool calls of a session by start time, missing starts first.
    pub fn list_by_session(conn: &Connection, session_id: &str, limit: usize) -> Result<Vec<ToolCall>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM tool_calls WHERE session_id = ?1
             ORDER BY started_at ASC, created_at ASC, tool_call_id ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Most recently completed calls across all sessions, at most `limit`.
    pub fn list_recently_completed(conn: &Connection, limit: usize) -> Result<Vec<ToolCall>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM tool_calls ORDER BY completed_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ToolCall> {
        let status: String = row.get("status")?;
        let status = status
            .parse::<ToolCallStatus>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
        Ok(ToolCall {
            session_id: row.get("session_id")?,
            tool_call_id: row.get("tool_call_id")?,
            tool_name: row.get("tool_name")?,
            step_index: row.get("step_index")?,
            status,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
            duration_ms: row.get("duration_ms")?,
            input_summary: json_column(row, "input_summary")?,
            result_summary: json_column(row, "result_summary")?,
            token_usage: json_column(row, "token_usage")?,
            cost_usd: row.get("cost_usd")?,
            is_error: row.get("is_error")?,
            outbound_payload: json_column(row, "outbound_payload")?,
            outbound_sequence: row.get("outbound_sequence")?,
            outbound_at: row.get("outbound_at")?,
            inbound_payload: json_column(row, "inbound_payload")?,
            inbound_sequence: row.get("inbound_sequence")?,
            inbound_at: row.get("inbound_at")?,
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
    use crate::sqlite::repositories::session::SessionRepo;
    use runlog_core::{Session, Usage};
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        SessionRepo::insert(&conn, &Session::new("s1", "r1", 0)).unwrap();
        conn
    }

    fn call(id: &str, started: Option<i64>, completed: Option<i64>) -> ToolCall {
        let mut c = ToolCall::new("s1", id, 10);
        c.started_at = started;
        c.completed_at = completed;
        if completed.is_some() {
            c.status = ToolCallStatus::Completed;
        }
        c
    }

    #[test]
    fn roundtrip_with_json_columns() {
        let conn = setup();
        let mut c = call("tc_1", Some(5), Some(9));
        c.result_summary = Some(json!({"isError": false, "preview": "ok"}));
        c.token_usage = Some(Usage {
            prompt_tokens: Some(3.0),
            ..Usage::default()
        });
        c.cost_usd = Some(0.25);
        c.is_error = true;
        ToolCallRepo::upsert(&conn, &c).unwrap();

        let loaded = ToolCallRepo::get(&conn, "s1", "tc_1").unwrap().unwrap();
        assert_eq!(loaded, c);
    }

    #[test]
    fn upsert_preserves_created_at() {
        let conn = setup();
        ToolCallRepo::upsert(&conn, &call("tc_1", None, None)).unwrap();
        let mut later = call("tc_1", Some(1), None);
        later.created_at = 50;
        later.updated_at = 50;
        ToolCallRepo::upsert(&conn, &later).unwrap();

        let loaded = ToolCallRepo::get(&conn, "s1", "tc_1").unwrap().unwrap();
        assert_eq!(loaded.created_at, 10);
        assert_eq!(loaded.updated_at, 50);
        assert_eq!(loaded.started_at, Some(1));
    }

    #[test]
    fn missing_start_sorts_first() {
        let conn = setup();
        ToolCallRepo::upsert(&conn, &call("b", Some(20), None)).unwrap();
        ToolCallRepo::upsert(&conn, &call("a", Some(10), None)).unwrap();
        ToolCallRepo::upsert(&conn, &call("z", None, None)).unwrap();

        let ids: Vec<String> = ToolCallRepo::list_by_session(&conn, "s1", 10)
            .unwrap()
            .into_iter()
            .map(|c| c.tool_call_id)
            .collect();
        assert_eq!(ids, vec!["z", "a", "b"]);
    }

    #[test]
    fn recently_completed_newest_first() {
        let conn = setup();
        ToolCallRepo::upsert(&conn, &call("old", Some(1), Some(100))).unwrap();
        ToolCallRepo::upsert(&conn, &call("new", Some(1), Some(300))).unwrap();
        ToolCallRepo::upsert(&conn, &call("open", Some(1), None)).unwrap();

        let ids: Vec<String> = ToolCallRepo::list_recently_completed(&conn, 2)
            .unwrap()
            .into_iter()
            .map(|c| c.tool_call_id)
            .collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}
