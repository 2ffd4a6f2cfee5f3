//! Sparse token-usage maps.
//!
//! A [`Usage`] holds up to six token categories. Absent categories are
//! `None` and are skipped on the wire, so stored JSON stays sparse.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::payload::coerce_f64;
use crate::round_to;

/// Token usage categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UsageKey {
    /// Prompt (input) tokens.
    PromptTokens,
    /// Completion (output) tokens.
    CompletionTokens,
    /// Total tokens as reported by the producer.
    TotalTokens,
    /// Reasoning tokens.
    ReasoningTokens,
    /// Cached input tokens.
    CachedInputTokens,
    /// Character count, for providers that bill by characters.
    CharCount,
}

impl UsageKey {
    /// All categories in wire order.
    pub const ALL: [Self; 6] = [
        Self::PromptTokens,
        Self::CompletionTokens,
        Self::TotalTokens,
        Self::ReasoningTokens,
        Self::CachedInputTokens,
        Self::CharCount,
    ];

    /// camelCase wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PromptTokens => "promptTokens",
            Self::CompletionTokens => "completionTokens",
            Self::TotalTokens => "totalTokens",
            Self::ReasoningTokens => "reasoningTokens",
            Self::CachedInputTokens => "cachedInputTokens",
            Self::CharCount => "charCount",
        }
    }

    /// `snake_case` spelling accepted on input.
    pub fn snake_str(self) -> &'static str {
        match self {
            Self::PromptTokens => "prompt_tokens",
            Self::CompletionTokens => "completion_tokens",
            Self::TotalTokens => "total_tokens",
            Self::ReasoningTokens => "reasoning_tokens",
            Self::CachedInputTokens => "cached_input_tokens",
            Self::CharCount => "char_count",
        }
    }
}

/// Sparse usage map keyed by [`UsageKey`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<f64>,
    /// Completion tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<f64>,
    /// Total tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<f64>,
    /// Reasoning tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<f64>,
    /// Cached input tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_input_tokens: Option<f64>,
    /// Character count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub char_count: Option<f64>,
}

impl Usage {
    /// Value for `key`, if recorded.
    pub fn get(&self, key: UsageKey) -> Option<f64> {
        match key {
            UsageKey::PromptTokens => self.prompt_tokens,
            UsageKey::CompletionTokens => self.completion_tokens,
            UsageKey::TotalTokens => self.total_tokens,
            UsageKey::ReasoningTokens => self.reasoning_tokens,
            UsageKey::CachedInputTokens => self.cached_input_tokens,
            UsageKey::CharCount => self.char_count,
        }
    }

    /// Set or clear the value for `key`.
    pub fn set(&mut self, key: UsageKey, value: Option<f64>) {
        let slot = match key {
            UsageKey::PromptTokens => &mut self.prompt_tokens,
            UsageKey::CompletionTokens => &mut self.completion_tokens,
            UsageKey::TotalTokens => &mut self.total_tokens,
            UsageKey::ReasoningTokens => &mut self.reasoning_tokens,
            UsageKey::CachedInputTokens => &mut self.cached_input_tokens,
            UsageKey::CharCount => &mut self.char_count,
        };
        *slot = value;
    }

    /// Whether at least one category is strictly positive.
    pub fn is_present(&self) -> bool {
        UsageKey::ALL
            .iter()
            .any(|k| self.get(*k).is_some_and(|v| v > 0.0))
    }

    /// Whether no category is recorded at all.
    pub fn is_empty(&self) -> bool {
        UsageKey::ALL.iter().all(|k| self.get(*k).is_none())
    }

    /// `totalTokens`, or 0 when not recorded.
    pub fn total(&self) -> f64 {
        self.total_tokens.unwrap_or(0.0)
    }

    /// Category-wise sum of two maps.
    ///
    /// Absent keys count as zero, sums are rounded to 4 decimal places and
    /// keys whose merged value is exactly zero are dropped. `totalTokens` is
    /// summed like any other key, never recomputed.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = Self::default();
        for key in UsageKey::ALL {
            if self.get(key).is_none() && other.get(key).is_none() {
                continue;
            }
            let sum = round_to(
                self.get(key).unwrap_or(0.0) + other.get(key).unwrap_or(0.0),
                4,
            );
            if sum != 0.0 {
                merged.set(key, Some(sum));
            }
        }
        merged
    }

    /// Read a usage map out of an arbitrary JSON value.
    ///
    /// Keys may be camelCase or `snake_case`; the camelCase value wins when
    /// both are numeric. Non-object input yields `None`; non-numeric
    /// categories are skipped.
    pub fn from_json(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let mut usage = Self::default();
        for key in UsageKey::ALL {
            let v = obj
                .get(key.as_str())
                .and_then(coerce_f64)
                .or_else(|| obj.get(key.snake_str()).and_then(coerce_f64));
            if v.is_some() {
                usage.set(key, v);
            }
        }
        Some(usage)
    }
}
