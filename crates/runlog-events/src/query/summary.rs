use rusqlite::Connection;
use serde::Serialize;

use runlog_core::{Session, ToolCall, round_to};

use super::{MAX_SESSIONS, RECENT_TOOL_CALL_SCAN, RECENT_TOOL_CALLS};
use crate::errors::Result;
use crate::sqlite::repositories::{SessionRepo, ToolCallRepo};

/// Cross-session rollup over the most recent sessions.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Window the sessions were filtered by, if any.
    pub window_ms: Option<i64>,
    /// Time the summary was computed (epoch ms).
    pub generated_at: i64,
    /// Sums over the included sessions.
    pub totals: SummaryTotals,
    /// Per-session means over the included sessions.
    pub averages: SummaryAverages,
    /// Most recently completed tool calls.
    pub recent_tool_calls: Vec<RecentToolCall>,
}

/// Summed counters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    /// Sessions included.
    pub sessions: usize,
    /// Included sessions without a `session_finished`.
    pub active_sessions: usize,
    /// Completed tool calls.
    pub tool_calls: i64,
    /// Sum of estimated `totalTokens`.
    pub estimated_tokens: f64,
    /// Sum of provider-reported `totalTokens`.
    pub actual_tokens: f64,
    /// Sum of estimated cost, 4 dp.
    #[serde(rename = "estimatedCostUSD")]
    pub estimated_cost_usd: f64,
    /// Sum of provider-reported cost, 4 dp.
    #[serde(rename = "actualCostUSD")]
    pub actual_cost_usd: f64,
}

/// Means per included session; zero when there are none.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryAverages {
    /// Tool calls per session.
    pub tool_calls_per_session: f64,
    /// Estimated tokens per session.
    pub estimated_tokens_per_session: f64,
    /// Estimated cost per session, 4 dp.
    #[serde(rename = "estimatedCostUSDPerSession")]
    pub estimated_cost_usd_per_session: f64,
    /// Mean end-to-end duration of sessions that have one.
    pub duration_ms: Option<f64>,
}

/// A completed tool call as listed in the summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentToolCall {
    /// Owning session.
    pub session_id: String,
    /// Call ID.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: Option<String>,
    /// Completion time.
    pub completed_at: i64,
    /// Measured duration.
    pub duration_ms: Option<i64>,
    /// Attributed cost.
    #[serde(rename = "costUSD")]
    pub cost_usd: Option<f64>,
    /// Whether the call failed.
    pub is_error: bool,
}

impl RecentToolCall {
    fn from_call(call: ToolCall) -> Option<Self> {
        Some(Self {
            completed_at: call.completed_at?,
            session_id: call.session_id,
            tool_call_id: call.tool_call_id,
            tool_name: call.tool_name,
            duration_ms: call.duration_ms,
            cost_usd: call.cost_usd,
            is_error: call.is_error,
        })
    }
}

/// Summarize the 200 most recent sessions, optionally only those created
/// within `window_ms` of `now`.
pub fn get_summary(conn: &Connection, window_ms: Option<i64>, now: i64) -> Result<UsageSummary> {
    let cutoff = window_ms.map(|w| now.saturating_sub(w));
    let sessions: Vec<Session> = SessionRepo::list_recent(conn, MAX_SESSIONS)?
        .into_iter()
        .filter(|s| cutoff.is_none_or(|c| s.created_at >= c))
        .collect();

    let totals = totals(&sessions);
    let averages = averages(&sessions, &totals);

    let recent_tool_calls = ToolCallRepo::list_recently_completed(conn, RECENT_TOOL_CALL_SCAN)?
        .into_iter()
        .filter_map(RecentToolCall::from_call)
        .take(RECENT_TOOL_CALLS)
        .collect();

    Ok(UsageSummary {
        window_ms,
        generated_at: now,
        totals,
        averages,
        recent_tool_calls,
    })
}

fn totals(sessions: &[Session]) -> SummaryTotals {
    let mut t = SummaryTotals {
        sessions: sessions.len(),
        ..SummaryTotals::default()
    };
    for s in sessions {
        if s.is_active() {
            t.active_sessions += 1;
        }
        t.tool_calls = t.tool_calls.saturating_add(s.tool_call_count);
        t.estimated_tokens += s.estimated_usage.as_ref().map_or(0.0, |u| u.total());
        t.actual_tokens += s.actual_usage.as_ref().map_or(0.0, |u| u.total());
        t.estimated_cost_usd += s.estimated_cost_usd;
        t.actual_cost_usd += s.actual_cost_usd;
    }
    t.estimated_cost_usd = round_to(t.estimated_cost_usd, 4);
    t.actual_cost_usd = round_to(t.actual_cost_usd, 4);
    t
}

fn averages(sessions: &[Session], totals: &SummaryTotals) -> SummaryAverages {
    if sessions.is_empty() {
        return SummaryAverages::default();
    }
    let n = sessions.len() as f64;
    let durations: Vec<f64> = sessions
        .iter()
        .filter_map(|s| s.timing().duration_ms)
        .map(|d| d as f64)
        .collect();
    SummaryAverages {
        tool_calls_per_session: round_to(totals.tool_calls as f64 / n, 4),
        estimated_tokens_per_session: round_to(totals.estimated_tokens / n, 4),
        estimated_cost_usd_per_session: round_to(totals.estimated_cost_usd / n, 4),
        duration_ms: (!durations.is_empty())
            .then(|| round_to(durations.iter().sum::<f64>() / durations.len() as f64, 1)),
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;
    use runlog_core::{ToolCallStatus, Usage};

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn session(id: &str, created_at: i64, cost: f64, tokens: f64, finished: bool) -> Session {
        let mut s = Session::new(id, "r", created_at);
        s.estimated_cost_usd = cost;
        s.tool_call_count = 2;
        s.estimated_usage = Some(Usage {
            total_tokens: Some(tokens),
            ..Usage::default()
        });
        if finished {
            s.session_finished_at = Some(created_at + 10);
        }
        s
    }

    #[test]
    fn empty_store_has_zero_averages() {
        let conn = setup();
        let summary = get_summary(&conn, None, 1_000).unwrap();
        assert_eq!(summary.totals.sessions, 0);
        assert_eq!(summary.averages, SummaryAverages::default());
        assert!(summary.recent_tool_calls.is_empty());
    }

    #[test]
    fn totals_and_averages() {
        let conn = setup();
        SessionRepo::insert(&conn, &session("a", 100, 1.000_04, 10.0, true)).unwrap();
        SessionRepo::insert(&conn, &session("b", 200, 2.0, 30.0, false)).unwrap();

        let summary = get_summary(&conn, None, 1_000).unwrap();
        assert_eq!(summary.totals.sessions, 2);
        assert_eq!(summary.totals.active_sessions, 1);
        assert_eq!(summary.totals.tool_calls, 4);
        assert!((summary.totals.estimated_tokens - 40.0).abs() < f64::EPSILON);
        assert!((summary.totals.estimated_cost_usd - 3.0).abs() < f64::EPSILON);
        assert!((summary.averages.tool_calls_per_session - 2.0).abs() < f64::EPSILON);
        assert!((summary.averages.estimated_tokens_per_session - 20.0).abs() < f64::EPSILON);
        assert!((summary.averages.estimated_cost_usd_per_session - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn window_excludes_older_sessions() {
        let conn = setup();
        SessionRepo::insert(&conn, &session("old", 100, 1.0, 1.0, true)).unwrap();
        SessionRepo::insert(&conn, &session("new", 900, 1.0, 1.0, true)).unwrap();

        let summary = get_summary(&conn, Some(200), 1_000).unwrap();
        assert_eq!(summary.totals.sessions, 1);
        assert_eq!(summary.window_ms, Some(200));

        let boundary = get_summary(&conn, Some(100), 1_000).unwrap();
        assert_eq!(boundary.totals.sessions, 1);
    }

    #[test]
    fn recent_tool_calls_skip_incomplete_and_cap_at_ten() {
        let conn = setup();
        SessionRepo::insert(&conn, &Session::new("s", "r", 0)).unwrap();
        for i in 0..15 {
            let mut call = ToolCall::new("s", format!("c{i}"), 0);
            call.status = ToolCallStatus::Completed;
            call.completed_at = Some(i);
            ToolCallRepo::upsert(&conn, &call).unwrap();
        }
        ToolCallRepo::upsert(&conn, &ToolCall::new("s", "open", 0)).unwrap();

        let summary = get_summary(&conn, None, 1_000).unwrap();
        assert_eq!(summary.recent_tool_calls.len(), 10);
        assert_eq!(summary.recent_tool_calls[0].tool_call_id, "c14");
        assert!(summary.recent_tool_calls.iter().all(|c| c.tool_call_id != "open"));
    }
}
