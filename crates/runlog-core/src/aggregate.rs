//! Materialized aggregate records: [`Session`], [`Step`] and [`ToolCall`].
//!
//! These are plain data. Handlers in `runlog-events` load a record, mutate it
//! through the helpers here and write the whole row back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::IngestEvent;
use crate::labels::SessionLabels;
use crate::merge::Merge;
use crate::timing::{DerivedTiming, TimingSignals};
use crate::usage::Usage;

/// One agent run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Producer-assigned identifier.
    pub session_id: String,
    /// Request that most recently reported on this session.
    pub request_id: String,
    /// Producer name from the envelope.
    pub source: Option<String>,
    /// Model name, from the envelope or `session_started`.
    pub model: Option<String>,
    /// Conversation thread the run belongs to.
    pub thread_id: Option<String>,
    /// Agent persona the run was configured with.
    pub persona_mode: Option<String>,
    /// End user the run was made for.
    pub user_identifier: Option<String>,
    /// Highest step index seen plus one, or the count reported at finish.
    pub step_count: i64,
    /// Number of completed tool calls folded into the totals.
    pub tool_call_count: i64,
    /// Running token usage summed from completed tool calls.
    pub estimated_usage: Option<Usage>,
    /// Provider-reported usage from `session_finished`.
    pub actual_usage: Option<Usage>,
    /// Sum of completed tool-call costs, 6 decimal places.
    #[serde(rename = "estimatedCostUSD")]
    pub estimated_cost_usd: f64,
    /// Provider-reported cost from `session_finished`.
    #[serde(rename = "actualCostUSD")]
    pub actual_cost_usd: f64,
    /// First `session_started` timestamp.
    pub session_started_at: Option<i64>,
    /// Latest `session_finished` timestamp.
    pub session_finished_at: Option<i64>,
    /// Earliest event timestamp seen.
    pub first_event_at: Option<i64>,
    /// Latest event timestamp seen.
    pub last_event_at: Option<i64>,
    /// Earliest user message timestamp.
    pub first_user_message_at: Option<i64>,
    /// Latest user message timestamp; orders `last_user_message_preview`.
    pub last_user_message_at: Option<i64>,
    /// Latest assistant message timestamp.
    pub last_assistant_message_at: Option<i64>,
    /// Derived start; see [`TimingSignals::derive`].
    pub end_to_end_started_at: Option<i64>,
    /// Derived finish.
    pub end_to_end_finished_at: Option<i64>,
    /// Derived duration, absent when finish precedes start.
    pub end_to_end_duration_ms: Option<i64>,
    /// Tools offered to the agent.
    pub tool_names: Option<Vec<String>>,
    /// Files attached to the opening user message.
    pub attachment_count: Option<i64>,
    /// Text of the newest user message by timestamp, truncated to 280
    /// characters.
    pub last_user_message_preview: Option<String>,
    /// Same, for the newest assistant message.
    pub last_assistant_message_preview: Option<String>,
    /// Raw title/tag storage; see [`SessionLabels`].
    #[serde(skip)]
    pub tags: Option<Vec<String>>,
    /// Server time of the first ingested event.
    pub created_at: i64,
    /// Server time of the latest write.
    pub updated_at: i64,
}

impl Session {
    /// Empty session first seen at `now`.
    pub fn new(session_id: impl Into<String>, request_id: impl Into<String>, now: i64) -> Self {
        Self {
            session_id: session_id.into(),
            request_id: request_id.into(),
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    /// Take the envelope context of `event`, newest non-empty value wins.
    pub fn reconcile_context(&mut self, event: &IngestEvent) {
        if !event.request_id.trim().is_empty() {
            self.request_id.clone_from(&event.request_id);
        }
        Merge::OverwriteIfPresent.apply(&mut self.source, event.source.clone());
        Merge::OverwriteIfPresent.apply(&mut self.model, event.model.clone());
        Merge::OverwriteIfPresent.apply(&mut self.thread_id, event.thread_id.clone());
        Merge::OverwriteIfPresent.apply(&mut self.persona_mode, event.persona_mode.clone());
        Merge::OverwriteIfPresent.apply(&mut self.user_identifier, event.user_identifier.clone());
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self, now: i64) {
        self.updated_at = now;
    }

    /// Timestamp signals feeding the end-to-end derivation.
    pub fn timing_signals(&self) -> TimingSignals {
        TimingSignals {
            first_user_message_at: self.first_user_message_at,
            last_assistant_message_at: self.last_assistant_message_at,
            session_started_at: self.session_started_at,
            session_finished_at: self.session_finished_at,
            first_event_at: self.first_event_at,
            last_event_at: self.last_event_at,
        }
    }

    /// Stored derived timing.
    pub fn stored_timing(&self) -> DerivedTiming {
        DerivedTiming {
            started_at: self.end_to_end_started_at,
            finished_at: self.end_to_end_finished_at,
            duration_ms: self.end_to_end_duration_ms,
        }
    }

    /// Stored derived timing, or a fresh derivation if it was never written.
    pub fn timing(&self) -> DerivedTiming {
        let stored = self.stored_timing();
        if stored == DerivedTiming::default() {
            self.timing_signals().derive()
        } else {
            stored
        }
    }

    /// Fill the stored derived timing with `derived`.
    pub fn set_timing(&mut self, derived: DerivedTiming) {
        self.end_to_end_started_at = derived.started_at;
        self.end_to_end_finished_at = derived.finished_at;
        self.end_to_end_duration_ms = derived.duration_ms;
    }

    /// Decoded title and tags.
    pub fn labels(&self) -> SessionLabels {
        self.tags
            .as_deref()
            .map(SessionLabels::decode)
            .unwrap_or_default()
    }

    /// Whether `session_finished` has been seen.
    pub fn is_active(&self) -> bool {
        self.session_finished_at.is_none()
    }
}

/// One reasoning step of a session.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Owning session.
    pub session_id: String,
    /// Zero-based position within the session.
    pub step_index: i64,
    /// Characters of model output.
    pub text_length: i64,
    /// Tool calls the model requested in this step.
    pub tool_call_count: i64,
    /// Tool results fed back into this step.
    pub tool_result_count: i64,
    /// Why generation stopped, as reported by the provider (`stop`, `length`).
    pub finish_reason: Option<String>,
    /// Tokens spent on this step alone.
    pub usage: Option<Usage>,
    /// Model output truncated to 280 characters.
    pub text_preview: Option<String>,
    /// Event timestamp of the `step_finished`.
    pub finished_at: i64,
    /// Server time the step row was first written.
    pub created_at: i64,
    /// Server time of the latest re-application.
    pub updated_at: i64,
}

/// Lifecycle state of a tool call.
///
/// Any state may be entered directly. Only [`ToolCallStatus::Completed`] is
/// sticky: once reached, earlier phases no longer overwrite it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Request seen.
    #[default]
    Started,
    /// Request dispatched to the tool.
    Outbound,
    /// Result received but not yet accounted. Accepted when decoding stored rows.
    InboundReceived,
    /// Result accounted into the session totals.
    Completed,
}

impl ToolCallStatus {
    /// Storage string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Outbound => "outbound",
            Self::InboundReceived => "inbound_received",
            Self::Completed => "completed",
        }
    }

    /// Status after a `next` phase event, given the current one.
    pub fn transition(current: Option<Self>, next: Self) -> Self {
        match current {
            Some(Self::Completed) => Self::Completed,
            _ => next,
        }
    }
}

impl fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised tool call status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tool call status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for ToolCallStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "started" => Ok(Self::Started),
            "outbound" => Ok(Self::Outbound),
            "inbound_received" => Ok(Self::InboundReceived),
            "completed" => Ok(Self::Completed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// One tool invocation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Owning session.
    pub session_id: String,
    /// Producer-assigned id, or `tc_<sequence>` when missing.
    pub tool_call_id: String,
    /// Latest non-empty name reported for the tool.
    pub tool_name: Option<String>,
    /// Step that issued the call, when reported.
    pub step_index: Option<i64>,
    /// Latest lifecycle phase; see [`ToolCallStatus::transition`].
    pub status: ToolCallStatus,
    /// First request timestamp, or inferred from the duration at completion.
    pub started_at: Option<i64>,
    /// Timestamp of the latest result event.
    pub completed_at: Option<i64>,
    /// Producer-measured run time; not derived from the timestamps.
    pub duration_ms: Option<i64>,
    /// Producer's digest of the tool arguments.
    pub input_summary: Option<Value>,
    /// Producer's digest of the tool output.
    pub result_summary: Option<Value>,
    /// Frozen once the call completes.
    pub token_usage: Option<Usage>,
    /// Frozen once the call completes.
    #[serde(rename = "costUSD")]
    pub cost_usd: Option<f64>,
    /// Whether the latest result reported a tool failure.
    pub is_error: bool,
    /// Raw payload of the outbound request.
    pub outbound_payload: Option<Value>,
    /// Event sequence of the latest `tool_call_outbound`.
    pub outbound_sequence: Option<i64>,
    /// Event timestamp of the latest `tool_call_outbound`.
    pub outbound_at: Option<i64>,
    /// Raw payload of the result.
    pub inbound_payload: Option<Value>,
    /// Event sequence of the latest `tool_call_inbound`.
    pub inbound_sequence: Option<i64>,
    /// Event timestamp of the latest `tool_call_inbound`.
    pub inbound_at: Option<i64>,
    /// Server time the call row was first written.
    pub created_at: i64,
    /// Server time of the latest write.
    pub updated_at: i64,
}

impl ToolCall {
    /// Fresh call record first seen at `now`.
    pub fn new(session_id: impl Into<String>, tool_call_id: impl Into<String>, now: i64) -> Self {
        Self {
            session_id: session_id.into(),
            tool_call_id: tool_call_id.into(),
            created_at: now,
            updated_at: now,
            ..Self::default()
        }
    }

    /// Whether the usage/cost of this call has been folded into its session.
    pub fn is_completed(&self) -> bool {
        self.status == ToolCallStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn completed_is_sticky() {
        use ToolCallStatus::*;
        assert_eq!(ToolCallStatus::transition(None, Outbound), Outbound);
        assert_eq!(ToolCallStatus::transition(Some(Outbound), Started), Started);
        assert_eq!(ToolCallStatus::transition(Some(Started), Completed), Completed);
        assert_eq!(ToolCallStatus::transition(Some(Completed), Started), Completed);
        assert_eq!(ToolCallStatus::transition(Some(Completed), Outbound), Completed);
    }

    #[test]
    fn status_string_roundtrip() {
        for s in ["started", "outbound", "inbound_received", "completed"] {
            assert_eq!(s.parse::<ToolCallStatus>().unwrap().as_str(), s);
        }
        assert_eq!(
            "done".parse::<ToolCallStatus>(),
            Err(UnknownStatus("done".into()))
        );
    }

    #[test]
    fn reconcile_takes_newest_non_empty() {
        let mut session = Session::new("s1", "r1", 10);
        session.model = Some("old".into());

        let mut event = IngestEvent::new("s1", "r2", 1, 20, EventKind::StepFinished);
        event.model = Some(String::new());
        event.thread_id = Some("t1".into());
        session.reconcile_context(&event);

        assert_eq!(session.request_id, "r2");
        assert_eq!(session.model.as_deref(), Some("old"));
        assert_eq!(session.thread_id.as_deref(), Some("t1"));
    }

    #[test]
    fn timing_falls_back_when_never_stored() {
        let mut session = Session::new("s1", "r1", 0);
        session.first_event_at = Some(5);
        session.last_event_at = Some(15);
        assert_eq!(session.stored_timing(), DerivedTiming::default());
        assert_eq!(session.timing().duration_ms, Some(10));

        session.set_timing(DerivedTiming {
            started_at: Some(1),
            finished_at: Some(2),
            duration_ms: Some(1),
        });
        assert_eq!(session.timing().duration_ms, Some(1));
    }

    #[test]
    fn labels_decode_from_storage() {
        let mut session = Session::new("s1", "r1", 0);
        assert_eq!(session.labels(), SessionLabels::default());
        session.tags = Some(vec!["title:Demo".into(), "tag:x".into()]);
        let labels = session.labels();
        assert_eq!(labels.title.as_deref(), Some("Demo"));
        assert_eq!(labels.tags, vec!["x"]);
    }

    #[test]
    fn serializes_cost_fields_with_usd_suffix() {
        let session = Session::new("s1", "r1", 0);
        let v = serde_json::to_value(&session).unwrap();
        assert!(v.get("estimatedCostUSD").is_some());
        assert!(v.get("tags").is_none());

        let call = ToolCall::new("s1", "tc_1", 0);
        let v = serde_json::to_value(&call).unwrap();
        assert_eq!(v["status"], "started");
        assert!(v.get("costUSD").is_some());
    }
}
