//! Event ingestion: dedup, dispatch and aggregate upserts.
//!
//! [`ingest`] runs inside a caller-owned transaction:
//!
//! 1. Idempotent append to the event log.
//! 2. Resolve or create the session and reconcile its envelope context. An
//!    unknown session id arriving under a request id another session already
//!    owns becomes an alias of that session.
//! 3. Dispatch the parsed payload to its handler.
//! 4. Widen the event bounds and refresh derived timing.
//! 5. Write the session row back.
//!
//! Steps 2-5 run for duplicates too. Every handler is safe to re-apply, so a
//! redelivery repairs aggregates that a partial earlier attempt missed.

mod session;
mod step;
mod timing;
mod tool_call;

use std::borrow::Cow;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use runlog_core::{EventPayload, IngestEvent, Session};

use crate::errors::Result;
use crate::sqlite::repositories::{EventRepo, SessionRepo};

/// Result of ingesting one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Always `true` once the transaction commits.
    pub ok: bool,
    /// `false` when `(session_id, sequence)` was already logged.
    pub appended: bool,
}

/// Apply `event` to the log and aggregates. `now` stamps `created_at`/`updated_at`.
pub fn ingest(conn: &Connection, event: &IngestEvent, now: i64) -> Result<IngestOutcome> {
    let appended = EventRepo::append(conn, event, now)?;
    if !appended {
        debug!(
            session_id = %event.session_id,
            sequence = event.sequence,
            kind = %event.kind,
            "duplicate event, re-applying handlers"
        );
    }

    let canonical = canonical_event(conn, event, now)?;
    let event = &*canonical;
    let mut session = resolve_session(conn, event, now)?;
    session.reconcile_context(event);

    match EventPayload::parse(event) {
        EventPayload::SessionStarted(p) => session::on_started(&mut session, event, &p),
        EventPayload::SessionFinished(p) => session::on_finished(&mut session, event, &p),
        EventPayload::MessageLogged(p) => session::on_message(&mut session, event, &p),
        EventPayload::StepFinished(p) => step::on_finished(conn, &mut session, event, &p, now)?,
        EventPayload::ToolCallStarted(p) => {
            tool_call::on_request(conn, event, &p, tool_call::Phase::Started, now)?;
        }
        EventPayload::ToolCallOutbound(p) => {
            tool_call::on_request(conn, event, &p, tool_call::Phase::Outbound, now)?;
        }
        EventPayload::ToolCallInbound(p) => {
            tool_call::on_result(conn, &mut session, event, &p, tool_call::Phase::Inbound, now)?;
        }
        EventPayload::ToolCallFinished(p) => {
            tool_call::on_result(conn, &mut session, event, &p, tool_call::Phase::Finished, now)?;
        }
        EventPayload::Other => {}
    }

    session.touch(now);
    if timing::refresh(&mut session, event.timestamp) {
        debug!(
            session_id = %session.session_id,
            duration_ms = ?session.end_to_end_duration_ms,
            "derived timing changed"
        );
    }
    SessionRepo::save(conn, &session)?;

    Ok(IngestOutcome { ok: true, appended })
}

/// `event` re-keyed onto the session it belongs to. The log keeps the
/// producer's id; aggregates follow the alias.
fn canonical_event<'a>(
    conn: &Connection,
    event: &'a IngestEvent,
    now: i64,
) -> Result<Cow<'a, IngestEvent>> {
    if SessionRepo::get(conn, &event.session_id)?.is_some() {
        return Ok(Cow::Borrowed(event));
    }
    if let Some(target) = SessionRepo::alias_target(conn, &event.session_id)? {
        return Ok(Cow::Owned(rekeyed(event, target)));
    }
    if event.request_id.trim().is_empty() {
        return Ok(Cow::Borrowed(event));
    }
    let Some(owner) = SessionRepo::find_by_request_id(conn, &event.request_id)? else {
        return Ok(Cow::Borrowed(event));
    };
    SessionRepo::add_alias(conn, &event.session_id, &owner.session_id, &event.request_id, now)?;
    info!(
        alias = %event.session_id,
        session_id = %owner.session_id,
        request_id = %event.request_id,
        "session id aliased by shared request id"
    );
    Ok(Cow::Owned(rekeyed(event, owner.session_id)))
}

fn rekeyed(event: &IngestEvent, session_id: String) -> IngestEvent {
    IngestEvent {
        session_id,
        ..event.clone()
    }
}

fn resolve_session(conn: &Connection, event: &IngestEvent, now: i64) -> Result<Session> {
    if let Some(existing) = SessionRepo::get(conn, &event.session_id)? {
        return Ok(existing);
    }
    let session = Session::new(&event.session_id, &event.request_id, now);
    SessionRepo::insert(conn, &session)?;
    info!(
        session_id = %event.session_id,
        request_id = %event.request_id,
        "session created"
    );
    Ok(session)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
