//! Tool call lifecycle handlers.
//!
//! Usage and cost of a call are folded into its session at most once: the
//! `completed` status is read before the call is touched, and only a call
//! that was not yet completed contributes. A later result for a completed
//! call refreshes its metadata but leaves usage and cost exactly as first
//! recorded, on the call and on the session alike.

use rusqlite::Connection;
use tracing::debug;

use runlog_core::payload::{ToolCallRequestPayload, ToolCallResultPayload};
use runlog_core::{IngestEvent, Merge, Session, ToolCall, ToolCallStatus, round_to};

use crate::errors::Result;
use crate::sqlite::repositories::ToolCallRepo;

/// Which lifecycle event is being applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Phase {
    Started,
    Outbound,
    Inbound,
    Finished,
}

impl Phase {
    fn status(self) -> ToolCallStatus {
        match self {
            Self::Started => ToolCallStatus::Started,
            Self::Outbound => ToolCallStatus::Outbound,
            Self::Inbound | Self::Finished => ToolCallStatus::Completed,
        }
    }
}

fn load(
    conn: &Connection,
    event: &IngestEvent,
    id: &str,
    now: i64,
) -> Result<(ToolCall, Option<ToolCallStatus>)> {
    Ok(match ToolCallRepo::get(conn, &event.session_id, id)? {
        Some(existing) => {
            let status = existing.status;
            (existing, Some(status))
        }
        None => (ToolCall::new(&event.session_id, id, now), None),
    })
}

/// `tool_call_started` / `tool_call_outbound`.
pub(super) fn on_request(
    conn: &Connection,
    event: &IngestEvent,
    p: &ToolCallRequestPayload,
    phase: Phase,
    now: i64,
) -> Result<()> {
    let (mut call, previous) = load(conn, event, &p.tool_call_id, now)?;

    call.status = ToolCallStatus::transition(previous, phase.status());
    Merge::PreserveFirst.apply(&mut call.started_at, Some(event.timestamp));
    Merge::OverwriteIfPresent.apply(&mut call.tool_name, p.tool_name.clone());
    Merge::OverwriteLatest.apply(&mut call.step_index, p.step_index);
    Merge::OverwriteLatest.apply(&mut call.input_summary, p.input_summary.clone());
    if phase == Phase::Outbound {
        call.outbound_payload = Some(p.raw.clone());
        call.outbound_sequence = Some(event.sequence);
        call.outbound_at = Some(event.timestamp);
    }
    call.updated_at = now;

    ToolCallRepo::upsert(conn, &call)
}

/// `tool_call_inbound` / `tool_call_finished`.
pub(super) fn on_result(
    conn: &Connection,
    session: &mut Session,
    event: &IngestEvent,
    p: &ToolCallResultPayload,
    phase: Phase,
    now: i64,
) -> Result<()> {
    let (mut call, previous) = load(conn, event, &p.tool_call_id, now)?;
    let already_completed = previous == Some(ToolCallStatus::Completed);

    let inferred_start = p
        .duration_ms
        .map_or(event.timestamp, |d| event.timestamp.saturating_sub(d));
    Merge::PreserveFirst.apply(&mut call.started_at, Some(inferred_start));
    call.status = phase.status();
    call.completed_at = Some(event.timestamp);
    Merge::OverwriteIfPresent.apply(&mut call.tool_name, p.tool_name.clone());
    Merge::OverwriteLatest.apply(&mut call.step_index, p.step_index);
    Merge::OverwriteLatest.apply(&mut call.duration_ms, p.duration_ms);
    Merge::OverwriteLatest.apply(&mut call.result_summary, p.result_summary.clone());
    call.is_error = p.is_error;
    if phase == Phase::Inbound {
        call.inbound_payload = Some(p.raw.clone());
        call.inbound_sequence = Some(event.sequence);
        call.inbound_at = Some(event.timestamp);
    }
    if !already_completed {
        Merge::OverwriteLatest.apply(&mut call.token_usage, p.token_usage.clone());
        Merge::OverwriteLatest.apply_num(&mut call.cost_usd, p.cost_usd);
    }
    call.updated_at = now;
    ToolCallRepo::upsert(conn, &call)?;

    if already_completed {
        debug!(
            session_id = %event.session_id,
            tool_call_id = %call.tool_call_id,
            "tool call already completed, usage and cost not re-folded"
        );
        if p.cost_usd.is_some_and(|c| Some(c) != call.cost_usd) {
            debug!(
                tool_call_id = %call.tool_call_id,
                recorded = ?call.cost_usd,
                received = ?p.cost_usd,
                "late cost correction ignored"
            );
        }
        return Ok(());
    }

    if let Some(usage) = p.token_usage.as_ref().filter(|u| u.is_present()) {
        let merged = session
            .estimated_usage
            .take()
            .unwrap_or_default()
            .merge(usage);
        session.estimated_usage = (!merged.is_empty()).then_some(merged);
    }
    if let Some(cost) = p.cost_usd {
        session.estimated_cost_usd = round_to(session.estimated_cost_usd + cost, 6);
    }
    session.tool_call_count = session.tool_call_count.saturating_add(1);
    Ok(())
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use crate::sqlite::repositories::SessionRepo;
    use runlog_core::{EventKind, EventPayload, Usage};
    use serde_json::{Value, json};

    fn setup() -> (Connection, Session) {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let session = Session::new("s1", "r1", 0);
        SessionRepo::insert(&conn, &session).unwrap();
        (conn, session)
    }

    fn event(seq: i64, ts: i64, kind: EventKind, payload: Value) -> IngestEvent {
        IngestEvent::new("s1", "r1", seq, ts, kind).with_payload(payload)
    }

    fn request(e: &IngestEvent) -> ToolCallRequestPayload {
        match EventPayload::parse(e) {
            EventPayload::ToolCallStarted(p) | EventPayload::ToolCallOutbound(p) => p,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    fn result(e: &IngestEvent) -> ToolCallResultPayload {
        match EventPayload::parse(e) {
            EventPayload::ToolCallInbound(p) | EventPayload::ToolCallFinished(p) => p,
            other => panic!("unexpected payload {other:?}"),
        }
    }

    fn get(conn: &Connection) -> ToolCall {
        ToolCallRepo::get(conn, "s1", "c1").unwrap().unwrap()
    }

    #[test]
    fn started_then_outbound_keeps_first_start() {
        let (conn, _) = setup();
        let started = event(1, 100, EventKind::ToolCallStarted, json!({"toolCallId": "c1", "toolName": "grep"}));
        on_request(&conn, &started, &request(&started), Phase::Started, 1).unwrap();
        let outbound = event(2, 150, EventKind::ToolCallOutbound, json!({"toolCallId": "c1", "args": [1]}));
        on_request(&conn, &outbound, &request(&outbound), Phase::Outbound, 2).unwrap();

        let call = get(&conn);
        assert_eq!(call.status, ToolCallStatus::Outbound);
        assert_eq!(call.started_at, Some(100));
        assert_eq!(call.tool_name.as_deref(), Some("grep"));
        assert_eq!(call.outbound_sequence, Some(2));
        assert_eq!(call.outbound_at, Some(150));
        assert_eq!(call.outbound_payload, Some(json!({"toolCallId": "c1", "args": [1]})));
    }

    #[test]
    fn result_backfills_start_from_duration() {
        let (conn, mut session) = setup();
        let finished = event(1, 1_000, EventKind::ToolCallFinished, json!({"toolCallId": "c1", "durationMs": 250}));
        on_result(&conn, &mut session, &finished, &result(&finished), Phase::Finished, 1).unwrap();

        let call = get(&conn);
        assert_eq!(call.started_at, Some(750));
        assert_eq!(call.completed_at, Some(1_000));
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert!(!call.is_error);
    }

    #[test]
    fn result_without_duration_starts_at_timestamp() {
        let (conn, mut session) = setup();
        let finished = event(1, 1_000, EventKind::ToolCallFinished, json!({"toolCallId": "c1"}));
        on_result(&conn, &mut session, &finished, &result(&finished), Phase::Finished, 1).unwrap();
        assert_eq!(get(&conn).started_at, Some(1_000));
    }

    #[test]
    fn fold_happens_once() {
        let (conn, mut session) = setup();
        let payload = json!({
            "toolCallId": "c1",
            "costUSD": 2.5,
            "tokenUsage": {"promptTokens": 10, "totalTokens": 10},
        });
        let first = event(1, 100, EventKind::ToolCallFinished, payload.clone());
        on_result(&conn, &mut session, &first, &result(&first), Phase::Finished, 1).unwrap();
        let dup = event(2, 120, EventKind::ToolCallFinished, payload);
        on_result(&conn, &mut session, &dup, &result(&dup), Phase::Finished, 2).unwrap();

        assert_eq!(session.tool_call_count, 1);
        assert!((session.estimated_cost_usd - 2.5).abs() < 1e-9);
        assert_eq!(session.estimated_usage.as_ref().unwrap().prompt_tokens, Some(10.0));
        assert_eq!(get(&conn).completed_at, Some(120));
    }

    #[test]
    fn late_cost_correction_is_ignored() {
        let (conn, mut session) = setup();
        let first = event(1, 100, EventKind::ToolCallFinished, json!({"toolCallId": "c1", "costUSD": 2.5}));
        on_result(&conn, &mut session, &first, &result(&first), Phase::Finished, 1).unwrap();
        let corrected = event(2, 110, EventKind::ToolCallFinished, json!({"toolCallId": "c1", "costUSD": 1.0}));
        on_result(&conn, &mut session, &corrected, &result(&corrected), Phase::Finished, 2).unwrap();

        assert_eq!(get(&conn).cost_usd, Some(2.5));
        assert!((session.estimated_cost_usd - 2.5).abs() < 1e-9);
    }

    #[test]
    fn inbound_snapshots_and_completes() {
        let (conn, mut session) = setup();
        let inbound = event(3, 200, EventKind::ToolCallInbound, json!({"toolCallId": "c1", "raw": {"x": 1}, "isError": true}));
        on_result(&conn, &mut session, &inbound, &result(&inbound), Phase::Inbound, 1).unwrap();

        let call = get(&conn);
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.inbound_sequence, Some(3));
        assert_eq!(call.inbound_at, Some(200));
        assert!(call.is_error);
        assert_eq!(session.tool_call_count, 1);
    }

    #[test]
    fn request_after_completion_keeps_completed() {
        let (conn, mut session) = setup();
        let done = event(1, 100, EventKind::ToolCallFinished, json!({"toolCallId": "c1"}));
        on_result(&conn, &mut session, &done, &result(&done), Phase::Finished, 1).unwrap();
        let late = event(2, 50, EventKind::ToolCallStarted, json!({"toolCallId": "c1"}));
        on_request(&conn, &late, &request(&late), Phase::Started, 2).unwrap();

        let call = get(&conn);
        assert_eq!(call.status, ToolCallStatus::Completed);
        assert_eq!(call.started_at, Some(100));
    }

    #[test]
    fn cost_fold_rounds_to_six_places() {
        let (conn, mut session) = setup();
        for (seq, id) in [(1, "a"), (2, "b"), (3, "c")] {
            let e = event(seq, 100, EventKind::ToolCallFinished, json!({"toolCallId": id, "costUSD": 0.1}));
            on_result(&conn, &mut session, &e, &result(&e), Phase::Finished, 1).unwrap();
        }
        assert!((session.estimated_cost_usd - 0.3).abs() < f64::EPSILON);
        assert_eq!(session.tool_call_count, 3);
    }

    #[test]
    fn absent_usage_leaves_session_usage_alone() {
        let (conn, mut session) = setup();
        session.estimated_usage = Some(Usage {
            total_tokens: Some(4.0),
            ..Usage::default()
        });
        let e = event(1, 100, EventKind::ToolCallFinished, json!({"toolCallId": "c1", "tokenUsage": {"totalTokens": 0}}));
        on_result(&conn, &mut session, &e, &result(&e), Phase::Finished, 1).unwrap();
        assert_eq!(session.estimated_usage.unwrap().total_tokens, Some(4.0));
    }
}
