//! Typed, lenient payload parsers, one per [`EventKind`].
//!
//! Producers send open-schema payloads. Every field is read through a
//! coercing accessor that returns `None` (or a default) for absent or
//! mistyped values, so a garbled payload degrades to missing fields instead
//! of failing the ingestion.

use serde_json::Value;

use crate::event::{EventKind, IngestEvent};
use crate::usage::Usage;

/// Maximum characters kept for message and step text previews.
pub const PREVIEW_CHARS: usize = 280;

/// Payload of an event, parsed according to its kind.
#[derive(Clone, Debug, PartialEq)]
pub enum EventPayload {
    /// `session_started`
    SessionStarted(SessionStartedPayload),
    /// `step_finished`
    StepFinished(StepFinishedPayload),
    /// `tool_call_started`
    ToolCallStarted(ToolCallRequestPayload),
    /// `tool_call_outbound`
    ToolCallOutbound(ToolCallRequestPayload),
    /// `tool_call_inbound`
    ToolCallInbound(ToolCallResultPayload),
    /// `tool_call_finished`
    ToolCallFinished(ToolCallResultPayload),
    /// `session_finished`
    SessionFinished(SessionFinishedPayload),
    /// `message_logged`
    MessageLogged(MessageLoggedPayload),
    /// Any other kind. Carries nothing; the dispatcher only touches the session.
    Other,
}

impl EventPayload {
    /// Parse `event.payload` according to `event.kind`.
    pub fn parse(event: &IngestEvent) -> Self {
        let p = &event.payload;
        match &event.kind {
            EventKind::SessionStarted => Self::SessionStarted(SessionStartedPayload::parse(p)),
            EventKind::StepFinished => Self::StepFinished(StepFinishedPayload::parse(p)),
            EventKind::ToolCallStarted => {
                Self::ToolCallStarted(ToolCallRequestPayload::parse(p, event.sequence))
            }
            EventKind::ToolCallOutbound => {
                Self::ToolCallOutbound(ToolCallRequestPayload::parse(p, event.sequence))
            }
            EventKind::ToolCallInbound => {
                Self::ToolCallInbound(ToolCallResultPayload::parse(p, event.sequence))
            }
            EventKind::ToolCallFinished => {
                Self::ToolCallFinished(ToolCallResultPayload::parse(p, event.sequence))
            }
            EventKind::SessionFinished => Self::SessionFinished(SessionFinishedPayload::parse(p)),
            EventKind::MessageLogged => Self::MessageLogged(MessageLoggedPayload::parse(p)),
            EventKind::Other(_) => Self::Other,
        }
    }
}

/// `session_started` payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStartedPayload {
    /// Explicit start time; the event timestamp is used when absent.
    pub started_at: Option<i64>,
    /// End-user identifier.
    pub user_identifier: Option<String>,
    /// Conversation thread.
    pub thread_id: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Persona mode label.
    pub persona_mode: Option<String>,
    /// Tools available to the agent.
    pub tool_names: Option<Vec<String>>,
    /// Number of attachments on the opening message.
    pub attachment_count: Option<i64>,
    /// Preview of the opening user message.
    pub user_message_preview: Option<String>,
    /// Preview of the latest assistant message.
    pub assistant_message_preview: Option<String>,
}

impl SessionStartedPayload {
    fn parse(p: &Value) -> Self {
        Self {
            started_at: i64_field(p, "startedAt"),
            user_identifier: str_field(p, "userIdentifier"),
            thread_id: str_field(p, "threadId"),
            model: str_field(p, "model"),
            persona_mode: str_field(p, "personaMode")
                .or_else(|| bool_field(p, "personaMode").map(|b| b.to_string())),
            tool_names: string_list_field(p, "toolNames"),
            attachment_count: i64_field(p, "attachmentCount"),
            user_message_preview: str_field(p, "userMessagePreview")
                .or_else(|| str_field(p, "userMessage"))
                .map(|s| preview(&s)),
            assistant_message_preview: str_field(p, "assistantMessagePreview")
                .map(|s| preview(&s)),
        }
    }
}

/// `step_finished` payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StepFinishedPayload {
    /// Zero-based step index (0 when absent).
    pub step_index: i64,
    /// Generated text length in characters.
    pub text_length: i64,
    /// Tool calls requested in this step.
    pub tool_call_count: i64,
    /// Tool results consumed in this step.
    pub tool_result_count: i64,
    /// Provider finish reason.
    pub finish_reason: Option<String>,
    /// Step usage, if reported.
    pub usage: Option<Usage>,
    /// Generated-text preview.
    pub text_preview: Option<String>,
}

impl StepFinishedPayload {
    fn parse(p: &Value) -> Self {
        let text = str_field(p, "text");
        let text_length = i64_field(p, "textLength")
            .or_else(|| text.as_ref().map(|t| t.chars().count() as i64))
            .unwrap_or(0);
        Self {
            step_index: i64_field(p, "stepIndex").unwrap_or(0).max(0),
            text_length,
            tool_call_count: i64_field(p, "toolCallCount").unwrap_or(0),
            tool_result_count: i64_field(p, "toolResultCount").unwrap_or(0),
            finish_reason: str_field(p, "finishReason"),
            usage: p.get("usage").and_then(Usage::from_json),
            text_preview: str_field(p, "textPreview")
                .or(text)
                .map(|s| preview(&s)),
        }
    }
}

/// `tool_call_started` / `tool_call_outbound` payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequestPayload {
    /// Tool call id, or `tc_<sequence>` when the producer omitted it.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: Option<String>,
    /// Step that issued the call.
    pub step_index: Option<i64>,
    /// Summarized tool input.
    pub input_summary: Option<Value>,
    /// The payload as received.
    pub raw: Value,
}

impl ToolCallRequestPayload {
    fn parse(p: &Value, sequence: i64) -> Self {
        Self {
            tool_call_id: tool_call_id(p, sequence),
            tool_name: str_field(p, "toolName"),
            step_index: i64_field(p, "stepIndex"),
            input_summary: non_null(p, "inputSummary").or_else(|| non_null(p, "input")),
            raw: p.clone(),
        }
    }
}

/// `tool_call_inbound` / `tool_call_finished` payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallResultPayload {
    /// Tool call id, or `tc_<sequence>` when the producer omitted it.
    pub tool_call_id: String,
    /// Tool name.
    pub tool_name: Option<String>,
    /// Step that issued the call.
    pub step_index: Option<i64>,
    /// Measured duration.
    pub duration_ms: Option<i64>,
    /// Summarized result.
    pub result_summary: Option<Value>,
    /// Usage attributed to the call.
    pub token_usage: Option<Usage>,
    /// Cost attributed to the call.
    pub cost_usd: Option<f64>,
    /// `resultSummary.isError` (falls back to a top-level `isError`).
    pub is_error: bool,
    /// The payload as received.
    pub raw: Value,
}

impl ToolCallResultPayload {
    fn parse(p: &Value, sequence: i64) -> Self {
        let result_summary = non_null(p, "resultSummary");
        let is_error = result_summary
            .as_ref()
            .and_then(|r| bool_field(r, "isError"))
            .or_else(|| bool_field(p, "isError"))
            .unwrap_or(false);
        Self {
            tool_call_id: tool_call_id(p, sequence),
            tool_name: str_field(p, "toolName"),
            step_index: i64_field(p, "stepIndex"),
            duration_ms: i64_field(p, "durationMs").filter(|d| *d >= 0),
            result_summary,
            token_usage: p
                .get("tokenUsage")
                .or_else(|| p.get("usage"))
                .and_then(Usage::from_json),
            cost_usd: f64_field(p, "costUSD").or_else(|| f64_field(p, "costUsd")),
            is_error,
            raw: p.clone(),
        }
    }
}

/// `session_finished` payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionFinishedPayload {
    /// Explicit finish time; the event timestamp is used when absent.
    pub finished_at: Option<i64>,
    /// Final step count.
    pub step_count: Option<i64>,
    /// Final tool call count.
    pub tool_call_count: Option<i64>,
    /// Final estimated usage.
    pub estimated_usage: Option<Usage>,
    /// Final provider-reported usage.
    pub actual_usage: Option<Usage>,
    /// Final estimated cost.
    pub estimated_cost_usd: Option<f64>,
    /// Final provider-reported cost.
    pub actual_cost_usd: Option<f64>,
}

impl SessionFinishedPayload {
    fn parse(p: &Value) -> Self {
        Self {
            finished_at: i64_field(p, "finishedAt"),
            step_count: i64_field(p, "stepCount"),
            tool_call_count: i64_field(p, "toolCallCount"),
            estimated_usage: p.get("estimatedUsage").and_then(Usage::from_json),
            actual_usage: p.get("actualUsage").and_then(Usage::from_json),
            estimated_cost_usd: f64_field(p, "estimatedCostUSD")
                .or_else(|| f64_field(p, "estimatedCostUsd")),
            actual_cost_usd: f64_field(p, "actualCostUSD")
                .or_else(|| f64_field(p, "actualCostUsd")),
        }
    }
}

/// Speaker of a logged message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageRole {
    /// End user.
    User,
    /// The agent.
    Assistant,
    /// System, tool, or anything unrecognised.
    Other,
}

/// `message_logged` payload.
#[derive(Clone, Debug, PartialEq)]
pub struct MessageLoggedPayload {
    /// Speaker.
    pub role: MessageRole,
    /// Message text, flattened from string or block content.
    pub text: Option<String>,
    /// Message time; the event timestamp is used when absent.
    pub timestamp: Option<i64>,
}

impl MessageLoggedPayload {
    fn parse(p: &Value) -> Self {
        let role = match str_field(p, "role").as_deref().map(str::to_ascii_lowercase) {
            Some(r) if r == "user" => MessageRole::User,
            Some(r) if r == "assistant" => MessageRole::Assistant,
            _ => MessageRole::Other,
        };
        Self {
            role,
            text: str_field(p, "text").or_else(|| content_text(p)),
            timestamp: i64_field(p, "timestamp"),
        }
    }
}

// ─── Coercing accessors ──────────────────────────────────────────────────────

/// Integer from a number (truncated) or a numeric string.
pub fn coerce_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

/// Float from a number or a numeric string.
pub fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn i64_field(p: &Value, key: &str) -> Option<i64> {
    p.get(key).and_then(coerce_i64)
}

fn f64_field(p: &Value, key: &str) -> Option<f64> {
    p.get(key).and_then(coerce_f64)
}

fn str_field(p: &Value, key: &str) -> Option<String> {
    p.get(key)?
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
}

fn bool_field(p: &Value, key: &str) -> Option<bool> {
    match p.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn string_list_field(p: &Value, key: &str) -> Option<Vec<String>> {
    let items = p.get(key)?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn non_null(p: &Value, key: &str) -> Option<Value> {
    p.get(key).filter(|v| !v.is_null()).cloned()
}

fn tool_call_id(p: &Value, sequence: i64) -> String {
    str_field(p, "toolCallId").unwrap_or_else(|| format!("tc_{sequence}"))
}

/// Text of a `content` field: either a string or `[{type: "text", text}]` blocks.
fn content_text(p: &Value) -> Option<String> {
    match p.get("content")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(blocks) => {
            let text: String = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

/// Truncate to [`PREVIEW_CHARS`] characters.
pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}
