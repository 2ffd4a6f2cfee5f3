use rusqlite::Connection;
use serde::Serialize;

use runlog_core::Session;

use super::{DEFAULT_SESSION_LIMIT, MAX_SESSIONS};
use crate::errors::Result;
use crate::sqlite::repositories::SessionRepo;

/// A session decorated for display: decoded labels and derived timing.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// The aggregate, with derived timing filled in if it was never stored.
    #[serde(flatten)]
    pub session: Session,
    /// Custom title.
    pub title: Option<String>,
    /// Tags in stored order.
    pub tags: Vec<String>,
}

impl From<Session> for SessionSummary {
    fn from(mut session: Session) -> Self {
        let labels = session.labels();
        let timing = session.timing();
        session.set_timing(timing);
        Self {
            session,
            title: labels.title,
            tags: labels.tags,
        }
    }
}

/// Newest sessions first. `limit` defaults to 25 and is clamped to 1..=200.
pub fn list_sessions(conn: &Connection, limit: Option<usize>) -> Result<Vec<SessionSummary>> {
    let limit = limit.unwrap_or(DEFAULT_SESSION_LIMIT).clamp(1, MAX_SESSIONS);
    Ok(SessionRepo::list_recent(conn, limit)?
        .into_iter()
        .map(SessionSummary::from)
        .collect())
}
