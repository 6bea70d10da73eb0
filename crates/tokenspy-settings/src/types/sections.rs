//! Individual settings sections.

use serde::{Deserialize, Serialize};
use tokenspy_core::logging::{LogFormat, LogLevel};

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level written to stderr.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
}

/// Usage database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Path to the `SQLite` usage database.
    pub db_path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            pool_size: 8,
            busy_timeout_ms: 5000,
        }
    }
}

/// Resolve the default database path (`~/.tokenspy/usage.db`).
pub fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    format!("{home}/.tokenspy/usage.db")
}

/// Session analyzer settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// History-size threshold `T` for recommendations, in characters.
    pub char_limit: u64,
    /// How far back status queries look, in hours.
    pub lookback_hours: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            char_limit: 200_000,
            lookback_hours: 24,
        }
    }
}

/// Defaults for read queries.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuerySettings {
    /// Window for usage and summary queries, in hours.
    pub default_hours: u32,
    /// Row limit for usage queries.
    pub usage_limit: u32,
    /// Row limit for the recent-events feed.
    pub recent_limit: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_hours: 24,
            usage_limit: 200,
            recent_limit: 100,
        }
    }
}

/// Outbound HTTP client policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// TCP/TLS connect timeout.
    pub connect_timeout_ms: u64,
    /// Maximum gap between reads on a response body. Long streams stay
    /// open as long as frames keep arriving.
    pub read_timeout_ms: u64,
    /// How long an idle pooled connection is kept.
    pub pool_idle_timeout_ms: u64,
    /// Maximum idle connections kept per host.
    pub max_idle_per_host: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: 300_000,
            pool_idle_timeout_ms: 30_000,
            max_idle_per_host: 10,
        }
    }
}

/// Per-provider override.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderOverride {
    /// Replacement upstream base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}
