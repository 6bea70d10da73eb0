//! # Provider Trait
//!
//! Core abstraction over LLM vendor wire protocols. Every protocol family
//! (Anthropic Messages, `OpenAI` Chat Completions) implements [`Provider`] to
//! expose pricing, request analysis, request rewriting, and usage extraction
//! behind one interface.
//!
//! Providers are stateless apart from a lazily built outbound HTTP client,
//! so one instance can serve any number of concurrent exchanges.

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokenspy_core::{RequestMetrics, TokenUsage, UsageFragment};
use tokenspy_settings::{HttpSettings, TokenSpySettings};

use crate::pricing::ModelPricing;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur during provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// No provider is registered under the requested name.
    #[error("Unknown provider: {name}. Available: {}", join_or_none(.available))]
    UnknownProvider {
        /// Requested name, as given.
        name: String,
        /// Registered names at lookup time.
        available: Vec<String>,
    },

    /// Request or response body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Building the outbound HTTP client failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Body parsed but does not have the expected shape.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Error category string for logs.
    pub fn category(&self) -> &str {
        match self {
            Self::UnknownProvider { .. } => "lookup",
            Self::Json(_) | Self::InvalidRequest { .. } => "parse",
            Self::Http(_) => "network",
        }
    }
}

fn join_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Per-instance provider configuration.
///
/// An empty config (no base URL, default HTTP policy) is equivalent to no
/// override at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Replacement upstream base URL.
    pub base_url: Option<String>,
    /// Outbound client policy.
    pub http: HttpSettings,
}

impl ProviderConfig {
    /// Config carrying only a base URL override.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Build the config for `provider` from loaded settings.
    pub fn from_settings(settings: &TokenSpySettings, provider: &str) -> Self {
        Self {
            base_url: settings
                .provider_override(provider)
                .and_then(|o| o.base_url.clone()),
            http: settings.http.clone(),
        }
    }

    /// Whether this config changes nothing relative to the defaults.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Vendor protocol capability set.
///
/// Implementors must be `Send + Sync`: the registry hands out shared
/// instances to concurrent requests. All analysis and extraction methods
/// are pure and synchronous.
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Provider identifier (e.g., `"anthropic"`, `"moonshot"`).
    fn name(&self) -> &str;

    /// Base URL used when no override is configured.
    fn default_base_url(&self) -> &str;

    /// Configuration this instance was built with.
    fn config(&self) -> &ProviderConfig;

    /// Primary API path (e.g., `/v1/messages`).
    fn api_endpoint(&self) -> &str;

    /// Effective base URL: the configured override, else the default.
    fn base_url(&self) -> &str {
        self.config()
            .base_url
            .as_deref()
            .unwrap_or_else(|| self.default_base_url())
    }

    /// Full upstream URL for the primary endpoint.
    fn upstream_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url().trim_end_matches('/'),
            self.api_endpoint()
        )
    }

    /// Per-million-token rates for `model`; all zero when unknown.
    fn pricing(&self, model: &str) -> ModelPricing;

    /// Extract size and structure metrics from a request body.
    fn analyze_request(&self, body: &Value) -> RequestMetrics;

    /// Apply vendor-compatibility transforms and return the body.
    fn rewrite_request(&self, body: Value) -> Value;

    /// Pull token usage from a complete (non-streamed) response.
    fn extract_usage_from_response(&self, response: &Value) -> TokenUsage;

    /// Pull any usage carried by one stream line.
    ///
    /// `event_kind` is the most recent `event:` name, for protocols that
    /// use one. Returns `None` for non-data lines, the `[DONE]` sentinel,
    /// unparsable payloads, and payloads without usage.
    fn extract_usage_from_stream(&self, line: &str, event_kind: Option<&str>)
    -> Option<UsageFragment>;

    /// Select the authentication headers to forward upstream.
    fn auth_headers(&self, inbound: &HeaderMap) -> HeaderMap;

    /// Estimated cost in USD for `usage` under `model`'s pricing.
    fn calculate_cost(&self, usage: &TokenUsage, model: &str) -> f64 {
        self.pricing(model).cost(usage)
    }

    /// Shared outbound client for this instance, built on first use.
    fn http_client(&self) -> ProviderResult<reqwest::Client>;
}

/// Copy the headers named in `names` from `inbound`, skipping empty values.
pub(crate) fn forward_headers(inbound: &HeaderMap, names: &[&'static str]) -> HeaderMap {
    let mut out = HeaderMap::new();
    for name in names {
        if let Some(value) = inbound.get(*name) {
            if !value.is_empty() {
                let _ = out.insert(*name, value.clone());
            }
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
