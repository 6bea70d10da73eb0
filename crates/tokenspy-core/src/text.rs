//! Text helpers shared by request analysis and logging.

/// Number of Unicode scalar values in `s`.
///
/// Prompt and history sizes are reported in characters, not bytes.
#[must_use]
pub fn char_len(s: &str) -> u64 {
    s.chars().count() as u64
}

/// Truncate `s` to at most `max_chars` characters, appending `...` when cut.
///
/// Used for log previews of payloads that failed to parse.
#[must_use]
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
