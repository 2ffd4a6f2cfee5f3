//! Title and tag mutations.
//!
//! Unknown sessions and blank tags are expected outcomes, reported through
//! [`TagUpdate::Rejected`] instead of an error.

use rusqlite::Connection;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::debug;

use runlog_core::SessionLabels;

use crate::errors::Result;
use crate::sqlite::repositories::SessionRepo;

/// Why a tag mutation was not applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagRejection {
    /// No such session.
    NotFound,
    /// The tag was empty after trimming.
    InvalidTag,
}

impl TagRejection {
    /// Wire code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidTag => "invalid_tag",
        }
    }
}

/// Outcome of a tag mutation, carrying the resulting title or tag list.
///
/// Serializes as `{"ok": true, "tag" | "tags": ...}` or
/// `{"ok": false, "error": "not_found" | "invalid_tag"}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TagUpdate<T> {
    /// The mutation was stored (or was a no-op on an existing session).
    Applied(T),
    /// Nothing was stored.
    Rejected(TagRejection),
}

/// Field name a [`TagUpdate`] payload is serialized under.
pub trait TagField {
    /// JSON key.
    const FIELD: &'static str;
}

impl TagField for Option<String> {
    const FIELD: &'static str = "tag";
}

impl TagField for Vec<String> {
    const FIELD: &'static str = "tags";
}

impl<T: Serialize + TagField> Serialize for TagUpdate<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            Self::Applied(value) => {
                map.serialize_entry("ok", &true)?;
                map.serialize_entry(T::FIELD, value)?;
            }
            Self::Rejected(reason) => {
                map.serialize_entry("ok", &false)?;
                map.serialize_entry("error", reason.as_str())?;
            }
        }
        map.end()
    }
}

/// Set the title; `None` or blank clears it.
pub fn set_session_tag(
    conn: &Connection,
    session_id: &str,
    title: Option<&str>,
    now: i64,
) -> Result<TagUpdate<Option<String>>> {
    update(conn, session_id, now, |labels| {
        labels.set_title(title);
        Some(labels.title.clone())
    })
}

/// Add a tag unless an equal one (ignoring case) is present.
pub fn add_session_tag(
    conn: &Connection,
    session_id: &str,
    tag: &str,
    now: i64,
) -> Result<TagUpdate<Vec<String>>> {
    update(conn, session_id, now, |labels| {
        labels.add_tag(tag).then(|| labels.tags.clone())
    })
}

/// Remove a tag, matching case-insensitively.
pub fn remove_session_tag(
    conn: &Connection,
    session_id: &str,
    tag: &str,
    now: i64,
) -> Result<TagUpdate<Vec<String>>> {
    update(conn, session_id, now, |labels| {
        labels.remove_tag(tag).then(|| labels.tags.clone())
    })
}

/// Load labels, apply `mutate` and store the result. `mutate` returns `None`
/// to reject the input as invalid.
fn update<T>(
    conn: &Connection,
    session_id: &str,
    now: i64,
    mutate: impl FnOnce(&mut SessionLabels) -> Option<T>,
) -> Result<TagUpdate<T>> {
    let Some(session_id) = SessionRepo::canonical_id(conn, session_id)? else {
        debug!(session_id, "tag update on unknown session");
        return Ok(TagUpdate::Rejected(TagRejection::NotFound));
    };
    let Some(stored) = SessionRepo::get_tags(conn, &session_id)? else {
        return Ok(TagUpdate::Rejected(TagRejection::NotFound));
    };
    let mut labels = SessionLabels::decode(stored.as_deref().unwrap_or_default());
    let Some(result) = mutate(&mut labels) else {
        return Ok(TagUpdate::Rejected(TagRejection::InvalidTag));
    };
    let _ = SessionRepo::set_tags(conn, &session_id, labels.encode().as_deref(), now)?;
    Ok(TagUpdate::Applied(result))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
