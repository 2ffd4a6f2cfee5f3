use rusqlite::Connection;
use serde::Serialize;

use runlog_core::{Step, ToolCall};

use super::sessions::SessionSummary;
use super::{MAX_TIMELINE_EVENTS, MAX_TIMELINE_STEPS, MAX_TIMELINE_TOOL_CALLS};
use crate::errors::Result;
use crate::sqlite::repositories::{EventRepo, SessionRepo, StepRepo, ToolCallRepo};
use crate::sqlite::row_types::EventRow;

/// Everything recorded for one session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTimeline {
    /// The decorated session.
    pub session: SessionSummary,
    /// Steps by ascending index.
    pub steps: Vec<Step>,
    /// Tool calls by start time, unknown starts first.
    pub tool_calls: Vec<ToolCall>,
    /// Raw events by sequence.
    pub events: Vec<EventRow>,
    /// Events logged for the session and its aliases, including any beyond
    /// the listing limit.
    pub event_count: i64,
}

/// Timeline of `session_id`, or `None` if the session is unknown. An alias
/// resolves to the session it points at, and the events logged under every
/// alias are included.
pub fn get_session_timeline(conn: &Connection, session_id: &str) -> Result<Option<SessionTimeline>> {
    let Some(session_id) = SessionRepo::canonical_id(conn, session_id)? else {
        return Ok(None);
    };
    let Some(session) = SessionRepo::get(conn, &session_id)? else {
        return Ok(None);
    };
    Ok(Some(SessionTimeline {
        session: session.into(),
        steps: StepRepo::list_by_session(conn, &session_id, MAX_TIMELINE_STEPS)?,
        tool_calls: ToolCallRepo::list_by_session(conn, &session_id, MAX_TIMELINE_TOOL_CALLS)?,
        events: events(conn, &session_id)?,
        event_count: event_count(conn, &session_id)?,
    }))
}

fn events(conn: &Connection, session_id: &str) -> Result<Vec<EventRow>> {
    let mut events = EventRepo::list_by_session(conn, session_id, MAX_TIMELINE_EVENTS)?;
    let aliases = SessionRepo::list_aliases(conn, session_id)?;
    if aliases.is_empty() {
        return Ok(events);
    }
    for alias in &aliases {
        events.extend(EventRepo::list_by_session(conn, alias, MAX_TIMELINE_EVENTS)?);
    }
    events.sort_by_key(|e| (e.timestamp, e.sequence, e.id));
    events.truncate(MAX_TIMELINE_EVENTS);
    Ok(events)
}

fn event_count(conn: &Connection, session_id: &str) -> Result<i64> {
    let mut total = EventRepo::count_by_session(conn, session_id)?;
    for alias in SessionRepo::list_aliases(conn, session_id)? {
        total += EventRepo::count_by_session(conn, &alias)?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ingest;
    use crate::sqlite::migrations::run_migrations;
    use runlog_core::{EventKind, IngestEvent};

    #[test]
    fn unknown_session_is_none() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        assert!(get_session_timeline(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn event_count_ignores_listing_limit() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let total = MAX_TIMELINE_EVENTS as i64 + 5;
        for seq in 0..total {
            let event = IngestEvent::new("s1", "r1", seq, seq, EventKind::from("heartbeat"));
            let _ = ingest(&conn, &event, 0).unwrap();
        }
        let timeline = get_session_timeline(&conn, "s1").unwrap().unwrap();
        assert_eq!(timeline.events.len(), MAX_TIMELINE_EVENTS);
        assert_eq!(timeline.event_count, total);
    }
}
