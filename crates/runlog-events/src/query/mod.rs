//! Read side: session listing, timelines and the windowed summary.
//!
//! Listing and summary read only the aggregate tables. The timeline is the
//! one query that replays the per-session event log.

mod sessions;
mod summary;
mod timeline;

pub use sessions::{SessionSummary, list_sessions};
pub use summary::{RecentToolCall, SummaryAverages, SummaryTotals, UsageSummary, get_summary};
pub use timeline::{SessionTimeline, get_session_timeline};

/// Default page size of [`list_sessions`].
pub const DEFAULT_SESSION_LIMIT: usize = 25;
/// Largest page of [`list_sessions`], and the number of sessions a summary scans.
pub const MAX_SESSIONS: usize = 200;
/// Steps returned per timeline.
pub const MAX_TIMELINE_STEPS: usize = 500;
/// Tool calls returned per timeline.
pub const MAX_TIMELINE_TOOL_CALLS: usize = 1000;
/// Raw events returned per timeline.
pub const MAX_TIMELINE_EVENTS: usize = 2000;
/// Completed tool calls fetched before filtering for the summary.
pub const RECENT_TOOL_CALL_SCAN: usize = 25;
/// Completed tool calls reported by the summary.
pub const RECENT_TOOL_CALLS: usize = 10;
