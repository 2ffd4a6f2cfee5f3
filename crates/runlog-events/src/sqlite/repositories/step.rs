//! Step repository, keyed by `(session_id, step_index)`.

use rusqlite::{Connection, OptionalExtension, params};

use runlog_core::Step;

use crate::errors::Result;
use crate::sqlite::row_types::{json_column, to_json_text};

/// Step repository. Stateless, every method takes `&Connection`.
pub struct StepRepo;

impl StepRepo {
    /// Step by natural key.
    pub fn get(conn: &Connection, session_id: &str, step_index: i64) -> Result<Option<Step>> {
        let row = conn
            .query_row(
                "SELECT * FROM steps WHERE session_id = ?1 AND step_index = ?2",
                params![session_id, step_index],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Insert or overwrite a step. An existing row keeps its `created_at`.
    pub fn upsert(conn: &Connection, step: &Step) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO steps (session_id, step_index, text_length, tool_call_count,
             tool_result_count, finish_reason, usage, text_preview, finished_at, created_at,
             updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (session_id, step_index) DO UPDATE SET
               text_length = excluded.text_length,
               tool_call_count = excluded.tool_call_count,
               tool_result_count = excluded.tool_result_count,
               finish_reason = excluded.finish_reason,
               usage = excluded.usage,
               text_preview = excluded.text_preview,
               finished_at = excluded.finished_at,
               updated_at = excluded.updated_at",
            params![
                step.session_id,
                step.step_index,
                step.text_length,
                step.tool_call_count,
                step.tool_result_count,
                step.finish_reason,
                to_json_text(step.usage.as_ref())?,
                step.text_preview,
                step.finished_at,
                step.created_at,
                step.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Steps of a session by ascending index, at most `limit`.
    pub fn list_by_session(conn: &Connection, session_id: &str, limit: usize) -> Result<Vec<Step>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM steps WHERE session_id = ?1 ORDER BY step_index ASC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![session_id, limit as i64], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Step> {
        Ok(Step {
            session_id: row.get("session_id")?,
            step_index: row.get("step_index")?,
            text_length: row.get("text_length")?,
            tool_call_count: row.get("tool_call_count")?,
            tool_result_count: row.get("tool_result_count")?,
            finish_reason: row.get("finish_reason")?,
            usage: json_column(row, "usage")?,
            text_preview: row.get("text_preview")?,
            finished_at: row.get("finished_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
