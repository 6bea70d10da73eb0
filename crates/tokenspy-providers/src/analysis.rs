//! Request-body analysis helpers shared by the protocol families.

use serde_json::Value;
use tokenspy_core::text::char_len;
use tokenspy_core::{RequestMetrics, WorkspaceSection};

/// Role counts over a message array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct MessageStats {
    pub total: u64,
    pub user: u64,
    pub assistant: u64,
}

impl MessageStats {
    /// Count messages by `role`. Non-array input counts as empty.
    pub(crate) fn count(messages: Option<&Value>) -> Self {
        let mut stats = Self::default();
        let Some(items) = messages.and_then(Value::as_array) else {
            return stats;
        };
        stats.total = items.len() as u64;
        for message in items {
            match message.get("role").and_then(Value::as_str) {
                Some("user") => stats.user += 1,
                Some("assistant") => stats.assistant += 1,
                _ => {}
            }
        }
        stats
    }

    /// Copy the counts into `metrics`.
    pub(crate) fn apply(self, metrics: &mut RequestMetrics) {
        metrics.message_count = self.total;
        metrics.user_message_count = self.user;
        metrics.assistant_message_count = self.assistant;
    }
}

/// Characters in the compact, ASCII-escaped JSON rendering of `messages`.
///
/// Non-ASCII text counts as its `\uXXXX` escape: six characters per scalar,
/// twelve for scalars outside the Basic Multilingual Plane (a surrogate
/// pair). Missing messages count as an empty list (`[]`).
pub(crate) fn history_chars(messages: Option<&Value>) -> u64 {
    match messages {
        Some(value) => ascii_escaped_len(&value.to_string()),
        None => 2,
    }
}

/// Length of `s` once every non-ASCII scalar is written as a JSON escape.
fn ascii_escaped_len(s: &str) -> u64 {
    s.chars()
        .map(|c| if c.is_ascii() { 1 } else { 6 * c.len_utf16() as u64 })
        .fold(0, u64::saturating_add)
}

/// Characters in the compact JSON rendering of `value`.
pub(crate) fn compact_json_chars(value: &Value) -> u64 {
    char_len(&value.to_string())
}

/// Length of an array-valued field; anything else counts as zero.
pub(crate) fn array_len(value: Option<&Value>) -> u64 {
    value.and_then(Value::as_array).map_or(0, |items| items.len() as u64)
}

/// Attribute one system-prompt block of `chars` characters.
///
/// The first workspace section whose heading appears in `text` receives the
/// count; otherwise it goes to the base prompt.
pub(crate) fn attribute_block(metrics: &mut RequestMetrics, text: &str, chars: u64) {
    match WorkspaceSection::detect(text) {
        Some(section) => metrics.workspace.add(section, chars),
        None => metrics.base_prompt_chars = metrics.base_prompt_chars.saturating_add(chars),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
