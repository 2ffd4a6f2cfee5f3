//! End-to-end session timing.
//!
//! A session has three tiers of start/finish signals: message timestamps,
//! explicit lifecycle events, and the raw first/last event times. The most
//! specific tier that has a value wins, independently for start and finish.

use serde::Serialize;

/// Raw timestamp signals recorded on a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimingSignals {
    /// First user message.
    pub first_user_message_at: Option<i64>,
    /// Last assistant message.
    pub last_assistant_message_at: Option<i64>,
    /// `session_started` time.
    pub session_started_at: Option<i64>,
    /// `session_finished` time.
    pub session_finished_at: Option<i64>,
    /// Earliest event timestamp.
    pub first_event_at: Option<i64>,
    /// Latest event timestamp.
    pub last_event_at: Option<i64>,
}

/// Derived end-to-end bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedTiming {
    /// Start of the session as seen by the user.
    pub started_at: Option<i64>,
    /// End of the session as seen by the user.
    pub finished_at: Option<i64>,
    /// `finished_at - started_at`, only when both exist, are ordered and the
    /// difference fits in an `i64`.
    pub duration_ms: Option<i64>,
}

impl TimingSignals {
    /// Derive the end-to-end bounds.
    pub fn derive(&self) -> DerivedTiming {
        let started_at = self
            .first_user_message_at
            .or(self.session_started_at)
            .or(self.first_event_at);
        let finished_at = self
            .last_assistant_message_at
            .or(self.session_finished_at)
            .or(self.last_event_at);
        let duration_ms = match (started_at, finished_at) {
            (Some(s), Some(f)) if f >= s => f.checked_sub(s),
            _ => None,
        };
        DerivedTiming {
            started_at,
            finished_at,
            duration_ms,
        }
    }

    /// Widen the first/last event bounds with `timestamp`.
    pub fn observe_event(&mut self, timestamp: i64) {
        self.first_event_at = Some(self.first_event_at.map_or(timestamp, |t| t.min(timestamp)));
        self.last_event_at = Some(self.last_event_at.map_or(timestamp, |t| t.max(timestamp)));
    }
}
