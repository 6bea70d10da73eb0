//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial: missing fields take their [`Default`] value.

mod sections;

pub use sections::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// Loaded from `~/.tokenspy/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "session": { "charLimit": 150000 },
///   "providers": { "local": { "baseUrl": "http://gpu-box:8000" } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenSpySettings {
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Usage database location and pool tuning.
    pub storage: StorageSettings,
    /// Session analyzer thresholds.
    pub session: SessionSettings,
    /// Default query windows and limits.
    pub query: QuerySettings,
    /// Outbound HTTP client policy shared by all providers.
    pub http: HttpSettings,
    /// Per-provider configuration overrides, keyed by provider name.
    pub providers: BTreeMap<String, ProviderOverride>,
}

impl TokenSpySettings {
    /// Override for `provider` (case-insensitive), if configured.
    pub fn provider_override(&self, provider: &str) -> Option<&ProviderOverride> {
        self.providers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(provider))
            .map(|(_, o)| o)
    }
}
