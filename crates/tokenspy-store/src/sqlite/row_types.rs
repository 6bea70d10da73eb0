//! Database row types for mapping between `SQLite` rows and Rust structs.
//!
//! Token and character counts are stored as `INTEGER` (`i64`) and surfaced as
//! `u64`; negative or `NULL` values read back as 0.

use serde::{Deserialize, Serialize};
use tokenspy_core::UsageRecord;

/// A persisted usage row: the record plus its row id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredUsage {
    /// Row id (monotonic per database).
    pub id: i64,
    /// The stored record. Its `timestamp` is always set.
    #[serde(flatten)]
    pub record: UsageRecord,
}

/// Per-agent aggregate over a time window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Agent name.
    pub agent: String,
    /// Number of exchanges.
    pub turns: u64,
    /// Sum of input tokens.
    pub total_input_tokens: u64,
    /// Sum of output tokens.
    pub total_output_tokens: u64,
    /// Sum of cache-read tokens.
    pub total_cache_read: u64,
    /// Sum of cache-write tokens.
    pub total_cache_write: u64,
    /// Sum of estimated cost in USD.
    pub total_cost: f64,
    /// Mean input tokens per exchange.
    pub avg_input_tokens: f64,
    /// Largest single-exchange input.
    pub max_input_tokens: u64,
    /// Mean system-prompt size.
    pub avg_system_chars: f64,
    /// Mean conversation-history size.
    pub avg_history_chars: f64,
    /// Mean skill-injection size.
    pub avg_skill_chars: f64,
    /// Mean unattributed system-prompt size.
    pub avg_base_prompt_chars: f64,
}

/// Compact row for a live activity feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecentEvent {
    /// Row id.
    pub id: i64,
    /// Agent name.
    pub agent_name: String,
    /// Provider name, if recorded.
    pub provider: Option<String>,
    /// Model name, if recorded.
    pub model: Option<String>,
    /// Input tokens.
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Input plus output tokens.
    pub total_tokens: u64,
    /// Estimated cost in USD.
    pub cost_usd: f64,
    /// Write timestamp.
    pub timestamp: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_usage_serializes_flat() {
        let stored = StoredUsage {
            id: 7,
            record: UsageRecord {
                agent: "alpha".into(),
                model: "gpt-4o".into(),
                timestamp: Some("2026-01-01T00:00:00.000Z".into()),
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["agent"], "alpha");
        assert_eq!(json["input_tokens"], 0);
        assert_eq!(json["timestamp"], "2026-01-01T00:00:00.000Z");
        assert!(json.get("record").is_none());
    }

    #[test]
    fn recent_event_field_names() {
        let event = RecentEvent {
            id: 1,
            agent_name: "a".into(),
            provider: None,
            model: Some("m".into()),
            input_tokens: 3,
            output_tokens: 4,
            total_tokens: 7,
            cost_usd: 0.0,
            timestamp: "t".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["agent_name"], "a");
        assert_eq!(json["total_tokens"], 7);
        assert!(json["provider"].is_null());
    }
}
