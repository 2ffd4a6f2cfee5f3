//! Row shapes and JSON column helpers.
//!
//! Aggregate rows map straight onto the `runlog-core` records; only the
//! event log has its own row type. Sparse maps and lists are stored as JSON
//! text and read back through [`json_column`].

use rusqlite::Row;
use rusqlite::types::Type;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::Result;

/// Raw event row from the `events` table.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRow {
    /// Insertion order.
    pub id: i64,
    /// Session ID.
    pub session_id: String,
    /// Request ID at the time of the event.
    pub request_id: String,
    /// Producer sequence number.
    pub sequence: i64,
    /// Event time (epoch ms).
    pub timestamp: i64,
    /// Kind string.
    pub kind: String,
    /// Payload as received.
    pub payload: Value,
    /// Emitting component.
    pub source: Option<String>,
    /// Model identifier.
    pub model: Option<String>,
    /// Conversation thread.
    pub thread_id: Option<String>,
    /// Persona mode.
    pub persona_mode: Option<String>,
    /// End-user identifier.
    pub user_identifier: Option<String>,
    /// Producer dedup hint.
    pub dedupe_key: Option<String>,
    /// Time the first delivery was stored (epoch ms).
    pub received_at: i64,
}

/// Read a nullable JSON text column into `T`.
pub(crate) fn json_column<T: DeserializeOwned>(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<T>> {
    let Some(text) = row.get::<_, Option<String>>(column)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
}

/// Serialize an optional value for a nullable JSON text column.
pub(crate) fn to_json_text<T: Serialize + ?Sized>(value: Option<&T>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}
