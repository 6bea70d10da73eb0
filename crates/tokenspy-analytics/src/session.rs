//! Session-health analysis.
//!
//! Agents do not announce context resets, so a reset is inferred from the
//! history size: a turn whose conversation history is less than half of the
//! previous turn's (when the previous was over [`RESET_MIN_PREV_CHARS`])
//! starts a new session. Only the current session feeds the status.
//!
//! Recommendations scale with a character threshold `T`:
//!
//! | Condition                                        | Recommendation      |
//! |--------------------------------------------------|---------------------|
//! | history > 2.5·T                                  | `reset_recommended` |
//! | history > 2·T                                    | `compact_soon`      |
//! | history > T                                      | `monitor`           |
//! | cache-write ratio > 0.20 over ≥ 3 window turns   | `cache_unstable`    |
//! | otherwise                                        | `healthy`           |

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default recommendation threshold `T`, in characters.
pub const DEFAULT_CHAR_LIMIT: u64 = 200_000;

/// Default lookback horizon for loading samples.
pub const DEFAULT_LOOKBACK_HOURS: u32 = 24;

/// A drop only counts as a reset when the previous turn exceeded this size.
pub const RESET_MIN_PREV_CHARS: u64 = 1000;

/// Turns in the rolling window.
pub const ROLLING_WINDOW: usize = 5;

/// Cache-write share above which caching is considered unstable.
pub const CACHE_UNSTABLE_RATIO: f64 = 0.20;

/// Minimum window turns before `cache_unstable` can fire.
pub const CACHE_UNSTABLE_MIN_TURNS: usize = 3;

/// The per-turn fields the analyzer reads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSample {
    /// Serialized conversation size for the turn.
    pub conversation_history_chars: u64,
    /// Cache-read tokens.
    pub cache_read_tokens: u64,
    /// Cache-write tokens.
    pub cache_write_tokens: u64,
    /// Estimated turn cost in USD.
    pub estimated_cost_usd: f64,
    /// Write timestamp.
    pub timestamp: String,
}

/// Advice derived from the current session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    /// No turns in the lookback horizon.
    NoData,
    /// Nothing to do.
    Healthy,
    /// History above `T`; keep an eye on it.
    Monitor,
    /// History above 2·T; compact soon.
    CompactSoon,
    /// History above 2.5·T; reset the session.
    ResetRecommended,
    /// Prompt cache is being rewritten too often.
    CacheUnstable,
}

impl Recommendation {
    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::Healthy => "healthy",
            Self::Monitor => "monitor",
            Self::CompactSoon => "compact_soon",
            Self::ResetRecommended => "reset_recommended",
            Self::CacheUnstable => "cache_unstable",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived, read-only session snapshot. Money is rounded to 6 places and
/// ratios to 4.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    /// Agent the status describes.
    pub agent: String,
    /// Turns since the detected session start.
    pub current_session_turns: u64,
    /// History size of the latest turn.
    pub current_history_chars: u64,
    /// Cost of the latest turn.
    pub last_turn_cost: f64,
    /// Mean cost over the rolling window.
    pub avg_cost_last_5: f64,
    /// Cache-write share of cache traffic over the rolling window.
    pub cache_write_pct_last_5: f64,
    /// Total cost since the detected session start.
    pub cost_since_last_reset: f64,
    /// Same as `current_session_turns`.
    pub turns_since_last_reset: u64,
    /// Advice.
    pub recommendation: Recommendation,
}

impl SessionStatus {
    /// All-zero status for an agent with no samples.
    pub fn no_data(agent: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            current_session_turns: 0,
            current_history_chars: 0,
            last_turn_cost: 0.0,
            avg_cost_last_5: 0.0,
            cache_write_pct_last_5: 0.0,
            cost_since_last_reset: 0.0,
            turns_since_last_reset: 0,
            recommendation: Recommendation::NoData,
        }
    }
}

/// Computes [`SessionStatus`] from chronologically ordered samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionAnalyzer {
    char_limit: u64,
}

impl Default for SessionAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_CHAR_LIMIT)
    }
}

impl SessionAnalyzer {
    /// Analyzer with threshold `char_limit`.
    pub const fn new(char_limit: u64) -> Self {
        Self { char_limit }
    }

    /// Threshold `T`.
    pub const fn char_limit(&self) -> u64 {
        self.char_limit
    }

    /// Analyze `samples`, oldest first.
    #[allow(clippy::cast_precision_loss)] // Window length is at most 5
    pub fn analyze(&self, agent: &str, samples: &[SessionSample]) -> SessionStatus {
        let Some(last) = samples.last() else {
            return SessionStatus::no_data(agent);
        };

        let start = find_session_start(samples);
        let session = &samples[start..];
        let window = &session[session.len().saturating_sub(ROLLING_WINDOW)..];

        let cost_since_reset: f64 = session.iter().map(|s| s.estimated_cost_usd).sum();
        let window_cost: f64 = window.iter().map(|s| s.estimated_cost_usd).sum();
        let avg_cost = window_cost / window.len().max(1) as f64;
        let cache_pct = cache_write_ratio(window);

        let current_history = last.conversation_history_chars;
        let recommendation = recommend(current_history, cache_pct, window.len(), self.char_limit);
        debug!(
            agent,
            session_start = start,
            turns = session.len(),
            current_history,
            %recommendation,
            "session analyzed"
        );

        let turns = session.len() as u64;
        SessionStatus {
            agent: agent.to_string(),
            current_session_turns: turns,
            current_history_chars: current_history,
            last_turn_cost: round_to(last.estimated_cost_usd, 6),
            avg_cost_last_5: round_to(avg_cost, 6),
            cache_write_pct_last_5: round_to(cache_pct, 4),
            cost_since_last_reset: round_to(cost_since_reset, 6),
            turns_since_last_reset: turns,
            recommendation,
        }
    }
}

/// Index of the first sample of the current session.
///
/// The last adjacent pair where the previous size exceeds
/// [`RESET_MIN_PREV_CHARS`] and the current size is under half of it marks
/// the start. With no such pair the whole slice is one session.
pub fn find_session_start(samples: &[SessionSample]) -> usize {
    samples
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| {
            let prev = pair[0].conversation_history_chars;
            let curr = pair[1].conversation_history_chars;
            prev > RESET_MIN_PREV_CHARS && u128::from(curr) * 2 < u128::from(prev)
        })
        .map(|(i, _)| i + 1)
        .last()
        .unwrap_or(0)
}

/// Cache writes as a share of cache reads plus writes.
#[allow(clippy::cast_precision_loss)]
pub fn cache_write_ratio(window: &[SessionSample]) -> f64 {
    // u128 holds any window of u64 counts without overflow.
    let writes: u128 = window.iter().map(|s| u128::from(s.cache_write_tokens)).sum();
    let total: u128 = window
        .iter()
        .map(|s| u128::from(s.cache_read_tokens) + u128::from(s.cache_write_tokens))
        .sum();
    writes as f64 / total.max(1) as f64
}

/// Pick the recommendation, highest priority first.
pub fn recommend(
    history_chars: u64,
    cache_write_pct: f64,
    window_turns: usize,
    char_limit: u64,
) -> Recommendation {
    let history = u128::from(history_chars);
    let limit = u128::from(char_limit);
    if history * 2 > limit * 5 {
        Recommendation::ResetRecommended
    } else if history > limit * 2 {
        Recommendation::CompactSoon
    } else if history > limit {
        Recommendation::Monitor
    } else if cache_write_pct > CACHE_UNSTABLE_RATIO && window_turns >= CACHE_UNSTABLE_MIN_TURNS {
        Recommendation::CacheUnstable
    } else {
        Recommendation::Healthy
    }
}

#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
