//! The ingested event envelope and its [`EventKind`] discriminator.
//!
//! Events arrive as camelCase JSON. The envelope fields are strongly typed;
//! the `payload` stays an open [`Value`] until a kind-specific parser in
//! [`crate::payload`] reads it.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Event kinds emitted by the agent runtime.
///
/// Unrecognised kind strings are preserved in [`EventKind::Other`] so they
/// still land in the event log and touch their session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A session began.
    SessionStarted,
    /// A reasoning step completed.
    StepFinished,
    /// The model requested a tool call.
    ToolCallStarted,
    /// The tool call request left the runtime.
    ToolCallOutbound,
    /// The raw tool result came back.
    ToolCallInbound,
    /// The tool call finished with a summarized result.
    ToolCallFinished,
    /// The session ended.
    SessionFinished,
    /// A user or assistant message was logged.
    MessageLogged,
    /// Any other kind string.
    Other(String),
}

/// Every known (non-`Other`) kind, in wire order.
pub const KNOWN_KINDS: [EventKind; 8] = [
    EventKind::SessionStarted,
    EventKind::StepFinished,
    EventKind::ToolCallStarted,
    EventKind::ToolCallOutbound,
    EventKind::ToolCallInbound,
    EventKind::ToolCallFinished,
    EventKind::SessionFinished,
    EventKind::MessageLogged,
];

impl EventKind {
    /// Wire string for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::SessionStarted => "session_started",
            Self::StepFinished => "step_finished",
            Self::ToolCallStarted => "tool_call_started",
            Self::ToolCallOutbound => "tool_call_outbound",
            Self::ToolCallInbound => "tool_call_inbound",
            Self::ToolCallFinished => "tool_call_finished",
            Self::SessionFinished => "session_finished",
            Self::MessageLogged => "message_logged",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        KNOWN_KINDS
            .iter()
            .find(|k| k.as_str() == s)
            .cloned()
            .unwrap_or_else(|| Self::Other(s.to_owned()))
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from(s.as_str()))
    }
}

/// One telemetry event as submitted by a producer.
///
/// `(session_id, sequence)` is the dedup key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestEvent {
    /// Session this event belongs to.
    pub session_id: String,
    /// Request the session is currently attached to.
    pub request_id: String,
    /// Producer-assigned, monotonic per session.
    #[serde(deserialize_with = "lenient_i64")]
    pub sequence: i64,
    /// Epoch milliseconds.
    #[serde(deserialize_with = "lenient_i64")]
    pub timestamp: i64,
    /// Event discriminator.
    pub kind: EventKind,
    /// Kind-dependent payload.
    #[serde(default)]
    pub payload: Value,
    /// Emitting component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Conversation thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Persona mode label (booleans are stringified).
    #[serde(
        default,
        deserialize_with = "lenient_opt_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub persona_mode: Option<String>,
    /// End-user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<String>,
    /// Producer-side dedup hint, stored alongside the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
}

impl IngestEvent {
    /// Minimal event with an empty payload. Mostly useful in tests and tools.
    pub fn new(
        session_id: impl Into<String>,
        request_id: impl Into<String>,
        sequence: i64,
        timestamp: i64,
        kind: EventKind,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            request_id: request_id.into(),
            sequence,
            timestamp,
            kind,
            payload: Value::Object(serde_json::Map::new()),
            source: None,
            model: None,
            thread_id: None,
            persona_mode: None,
            user_identifier: None,
            dedupe_key: None,
        }
    }

    /// Replace the payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    crate::payload::coerce_i64(&value)
        .ok_or_else(|| de::Error::custom(format!("expected an integer, got {value}")))
}

fn lenient_opt_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Bool(b)) => Some(b.to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_kinds_roundtrip_through_strings() {
        for kind in &KNOWN_KINDS {
            let parsed: EventKind = kind.as_str().parse().unwrap();
            assert_eq!(&parsed, kind);
        }
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let kind = EventKind::from("heartbeat");
        assert_eq!(kind, EventKind::Other("heartbeat".into()));
        assert_eq!(kind.to_string(), "heartbeat");
    }

    #[test]
    fn deserializes_camel_case_envelope() {
        let evt: IngestEvent = serde_json::from_value(json!({
            "sessionId": "s1",
            "requestId": "r1",
            "sequence": 3,
            "timestamp": 1_700_000_000_000_i64,
            "kind": "step_finished",
            "payload": {"stepIndex": 2},
            "threadId": "t1",
            "personaMode": true,
        }))
        .unwrap();
        assert_eq!(evt.session_id, "s1");
        assert_eq!(evt.sequence, 3);
        assert_eq!(evt.kind, EventKind::StepFinished);
        assert_eq!(evt.thread_id.as_deref(), Some("t1"));
        assert_eq!(evt.persona_mode.as_deref(), Some("true"));
        assert!(evt.model.is_none());
    }

    #[test]
    fn coerces_numeric_strings_in_envelope() {
        let evt: IngestEvent = serde_json::from_value(json!({
            "sessionId": "s1",
            "requestId": "r1",
            "sequence": "7",
            "timestamp": 1_700_000_000_000.0,
            "kind": "session_started",
        }))
        .unwrap();
        assert_eq!(evt.sequence, 7);
        assert_eq!(evt.timestamp, 1_700_000_000_000);
        assert!(evt.payload.is_null());
    }

    #[test]
    fn rejects_missing_session_id() {
        let result: Result<IngestEvent, _> = serde_json::from_value(json!({
            "requestId": "r1",
            "sequence": 1,
            "timestamp": 1,
            "kind": "session_started",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn serializes_kind_as_string() {
        let evt = IngestEvent::new("s", "r", 1, 2, EventKind::ToolCallFinished);
        let v = serde_json::to_value(&evt).unwrap();
        assert_eq!(v["kind"], "tool_call_finished");
        assert!(v.get("model").is_none());
    }
}
