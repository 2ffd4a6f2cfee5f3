//! Session title and tags, stored together in one ordered string list.
//!
//! Storage format: `["title:<t>", "tag:<a>", "tag:<b>"]`. Older rows hold
//! bare strings; the first bare string is read as the title when no
//! `title:` entry exists, the rest as tags.

use serde::Serialize;

const TITLE_PREFIX: &str = "title:";
const TAG_PREFIX: &str = "tag:";

/// Decoded title and tags of a session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionLabels {
    /// Display title.
    pub title: Option<String>,
    /// Tags, unique case-insensitively, in first-seen order.
    pub tags: Vec<String>,
}

impl SessionLabels {
    /// Decode the stored list.
    pub fn decode<S: AsRef<str>>(stored: &[S]) -> Self {
        let has_title_entry = stored
            .iter()
            .any(|s| s.as_ref().starts_with(TITLE_PREFIX));

        let mut labels = Self::default();
        let mut bare_title_taken = has_title_entry;
        for entry in stored {
            let entry = entry.as_ref();
            if let Some(v) = entry.strip_prefix(TITLE_PREFIX) {
                if labels.title.is_none() {
                    labels.title = clean(v);
                }
            } else if let Some(v) = entry.strip_prefix(TAG_PREFIX) {
                labels.push_tag(v);
            } else if !bare_title_taken {
                bare_title_taken = true;
                labels.title = clean(entry);
            } else {
                labels.push_tag(entry);
            }
        }
        labels
    }

    /// Encode to the stored list; `None` when there is nothing to store.
    pub fn encode(&self) -> Option<Vec<String>> {
        let mut out = Vec::with_capacity(self.tags.len() + 1);
        if let Some(title) = self.title.as_deref().and_then(clean) {
            out.push(format!("{TITLE_PREFIX}{title}"));
        }
        out.extend(self.tags.iter().map(|t| format!("{TAG_PREFIX}{t}")));
        (!out.is_empty()).then_some(out)
    }

    /// Replace the title; blank input clears it.
    pub fn set_title(&mut self, title: Option<&str>) {
        self.title = title.and_then(clean);
    }

    /// Add a tag unless an equal one (ignoring case) exists.
    ///
    /// Returns `false` if `tag` is blank after trimming.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if clean(tag).is_none() {
            return false;
        }
        self.push_tag(tag);
        true
    }

    /// Remove every tag equal to `tag` ignoring case.
    ///
    /// Returns `false` if `tag` is blank after trimming.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let Some(tag) = clean(tag) else {
            return false;
        };
        let needle = tag.to_lowercase();
        self.tags.retain(|t| t.to_lowercase() != needle);
        true
    }

    fn push_tag(&mut self, raw: &str) {
        let Some(tag) = clean(raw) else { return };
        let needle = tag.to_lowercase();
        if !self.tags.iter().any(|t| t.to_lowercase() == needle) {
            self.tags.push(tag);
        }
    }
}

fn clean(v: &str) -> Option<String> {
    let v = v.trim();
    (!v.is_empty()).then(|| v.to_owned())
}
