//! `step_finished` handler.

use rusqlite::Connection;

use runlog_core::payload::StepFinishedPayload;
use runlog_core::{IngestEvent, Merge, Session, Step};

use crate::errors::Result;
use crate::sqlite::repositories::StepRepo;

pub(super) fn on_finished(
    conn: &Connection,
    session: &mut Session,
    event: &IngestEvent,
    p: &StepFinishedPayload,
    now: i64,
) -> Result<()> {
    let created_at = StepRepo::get(conn, &event.session_id, p.step_index)?
        .map_or(now, |existing| existing.created_at);

    StepRepo::upsert(
        conn,
        &Step {
            session_id: event.session_id.clone(),
            step_index: p.step_index,
            text_length: p.text_length,
            tool_call_count: p.tool_call_count,
            tool_result_count: p.tool_result_count,
            finish_reason: p.finish_reason.clone(),
            usage: p.usage.clone(),
            text_preview: p.text_preview.clone(),
            finished_at: event.timestamp,
            created_at,
            updated_at: now,
        },
    )?;

    session.step_count =
        Merge::MaxOf.fold_num(session.step_count, Some(p.step_index.saturating_add(1)));
    Ok(())
}
