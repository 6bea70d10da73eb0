//! Anthropic Messages API provider.
//!
//! The system prompt may be a plain string or a list of text blocks (often
//! carrying `cache_control`). Blocks are attributed to workspace sections by
//! heading. Streams use named events:
//!
//! - `message_start`: input and cache counts under `message.usage`
//! - `message_delta`: output count under `usage`, stop reason under `delta`
//! - everything else carries no usage

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokenspy_core::text::char_len;
use tokenspy_core::{RequestMetrics, TokenUsage, UsageFragment};

use crate::analysis::{MessageStats, array_len, attribute_block, history_chars};
use crate::client::CachedClient;
use crate::fields::{count, count_or_zero, non_empty_object, non_empty_str};
use crate::pricing::{ANTHROPIC_PRICING, ModelPricing};
use crate::provider::{Provider, ProviderConfig, ProviderResult, forward_headers};
use crate::sse::{extract_sse_data, parse_sse_data};

/// Default base URL for the Anthropic API.
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Headers forwarded upstream, in order.
const AUTH_HEADERS: &[&str] = &[
    "x-api-key",
    "anthropic-version",
    "anthropic-beta",
    "anthropic-dangerous-direct-browser-access",
];

/// Anthropic provider.
#[derive(Debug, Default)]
pub struct AnthropicProvider {
    config: ProviderConfig,
    client: CachedClient,
}

impl AnthropicProvider {
    /// Create a provider with the given configuration.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            client: CachedClient::default(),
        }
    }

    fn analyze_system(metrics: &mut RequestMetrics, system: &Value) {
        let blocks: Vec<&Value> = match system {
            Value::String(_) => vec![system],
            Value::Array(items) => items.iter().filter(|b| b.is_object()).collect(),
            _ => return,
        };

        for block in blocks {
            let text = match block {
                Value::String(s) => s.clone(),
                _ => match block.get("text") {
                    None => String::new(),
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                },
            };
            let chars = char_len(&text);
            metrics.system_prompt_total_chars =
                metrics.system_prompt_total_chars.saturating_add(chars);
            attribute_block(metrics, &text, chars);
        }
    }
}

impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_base_url(&self) -> &str {
        DEFAULT_BASE_URL
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn api_endpoint(&self) -> &str {
        "/v1/messages"
    }

    fn pricing(&self, model: &str) -> ModelPricing {
        ANTHROPIC_PRICING.lookup(model)
    }

    fn analyze_request(&self, body: &Value) -> RequestMetrics {
        let mut metrics = RequestMetrics::default();
        if let Some(system) = body.get("system") {
            Self::analyze_system(&mut metrics, system);
        }

        let messages = body.get("messages");
        MessageStats::count(messages).apply(&mut metrics);
        metrics.conversation_history_chars = history_chars(messages);
        metrics.tool_count = array_len(body.get("tools"));
        metrics
    }

    fn rewrite_request(&self, body: Value) -> Value {
        body
    }

    fn extract_usage_from_response(&self, response: &Value) -> TokenUsage {
        TokenUsage {
            input_tokens: count_or_zero(response, "/usage/input_tokens"),
            output_tokens: count_or_zero(response, "/usage/output_tokens"),
            cache_read_tokens: count_or_zero(response, "/usage/cache_read_input_tokens"),
            cache_write_tokens: count_or_zero(response, "/usage/cache_creation_input_tokens"),
            stop_reason: response
                .get("stop_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    fn extract_usage_from_stream(
        &self,
        line: &str,
        event_kind: Option<&str>,
    ) -> Option<UsageFragment> {
        let data: Value = parse_sse_data(extract_sse_data(line)?, self.name())?;

        let mut fragment = UsageFragment::default();
        match event_kind {
            Some("message_start") => {
                if let Some(usage) = non_empty_object(&data, "/message/usage") {
                    fragment.input_tokens = Some(count_or_zero(usage, "/input_tokens"));
                    fragment.cache_read_tokens =
                        Some(count_or_zero(usage, "/cache_read_input_tokens"));
                    fragment.cache_write_tokens =
                        Some(count_or_zero(usage, "/cache_creation_input_tokens"));
                }
            }
            Some("message_delta") => {
                fragment.output_tokens = count(&data, "/usage/output_tokens");
                fragment.stop_reason = non_empty_str(&data, "/delta/stop_reason");
            }
            _ => {}
        }
        fragment.non_empty()
    }

    fn auth_headers(&self, inbound: &HeaderMap) -> HeaderMap {
        forward_headers(inbound, AUTH_HEADERS)
    }

    fn http_client(&self) -> ProviderResult<reqwest::Client> {
        self.client.get_or_build(&self.config.http)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderName, HeaderValue};
    use serde_json::json;
    use tokenspy_core::WorkspaceSection;

    use super::*;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::default()
    }

    // ── identity ─────────────────────────────────────────────────────────

    #[test]
    fn identity_and_urls() {
        let p = provider();
        assert_eq!(p.name(), "anthropic");
        assert_eq!(p.base_url(), "https://api.anthropic.com");
        assert_eq!(p.upstream_url(), "https://api.anthropic.com/v1/messages");

        let custom = AnthropicProvider::new(ProviderConfig::with_base_url("http://proxy:8080/"));
        assert_eq!(custom.upstream_url(), "http://proxy:8080/v1/messages");
    }

    // ── analyze_request ──────────────────────────────────────────────────

    #[test]
    fn analyze_system_blocks_by_section() {
        let soul = "## SOUL.md\nBe kind.";
        let body = json!({
            "model": "claude-sonnet-4-5",
            "system": [
                {"type": "text", "text": "You are helpful."},
                {"type": "text", "text": soul, "cache_control": {"type": "ephemeral"}},
                "stray string block",
            ],
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
            ],
            "tools": [{"name": "a"}, {"name": "b"}],
        });
        let m = provider().analyze_request(&body);

        assert_eq!(m.system_prompt_total_chars, 16 + soul.len() as u64);
        assert_eq!(m.workspace.soul, soul.len() as u64);
        assert_eq!(m.base_prompt_chars, 16);
        assert_eq!(m.message_count, 2);
        assert_eq!(m.user_message_count, 1);
        assert_eq!(m.assistant_message_count, 1);
        assert_eq!(m.tool_count, 2);
        assert_eq!(
            m.conversation_history_chars,
            json!(body["messages"]).to_string().len() as u64
        );
    }

    #[test]
    fn analyze_attributes_every_workspace_section() {
        let blocks: Vec<(WorkspaceSection, String)> = WorkspaceSection::ALL
            .iter()
            .enumerate()
            .map(|(i, &section)| {
                (section, format!("## {}\n{}", section.file_name(), "x".repeat(i + 1)))
            })
            .collect();
        let system: Vec<Value> = blocks
            .iter()
            .map(|(_, text)| json!({"type": "text", "text": text}))
            .collect();
        let body = json!({"model": "claude-opus-4-6", "system": system, "messages": []});
        let m = provider().analyze_request(&body);

        for (section, text) in &blocks {
            assert_eq!(m.workspace.get(*section), text.chars().count() as u64, "{section:?}");
        }
        assert_eq!(m.base_prompt_chars, 0);
        assert_eq!(m.workspace.total(), m.system_prompt_total_chars);
    }

    #[test]
    fn analyze_string_system_is_one_block() {
        let body = json!({"system": "# MEMORY.md\nfacts", "messages": []});
        let m = provider().analyze_request(&body);
        assert_eq!(m.workspace.memory, 17);
        assert_eq!(m.system_prompt_total_chars, 17);
        assert_eq!(m.base_prompt_chars, 0);
        assert_eq!(m.conversation_history_chars, 2);
    }

    #[test]
    fn analyze_block_with_first_listed_section() {
        let text = "## MEMORY.md\n...\n## AGENTS.md\n...";
        let body = json!({"system": [{"type": "text", "text": text}]});
        let m = provider().analyze_request(&body);
        assert_eq!(m.workspace.agents, text.len() as u64);
        assert_eq!(m.workspace.memory, 0);
    }

    #[test]
    fn analyze_non_string_text_uses_json_rendering() {
        let body = json!({"system": [
            {"type": "text", "text": 12345},
            {"type": "text", "text": null},
            {"type": "image"},
        ]});
        let m = provider().analyze_request(&body);
        // "12345" + "null" + ""
        assert_eq!(m.system_prompt_total_chars, 9);
        assert_eq!(m.base_prompt_chars, 9);
    }

    #[test]
    fn analyze_ignores_other_system_shapes() {
        let body = json!({"system": {"text": "x"}, "messages": [{"role": "user", "content": "x"}]});
        let m = provider().analyze_request(&body);
        assert_eq!(m.system_prompt_total_chars, 0);
        assert_eq!(m.message_count, 1);
    }

    #[test]
    fn analyze_counts_unicode_scalars() {
        let body = json!({"system": "héllo wörld"});
        assert_eq!(provider().analyze_request(&body).system_prompt_total_chars, 11);
    }

    #[test]
    fn rewrite_is_identity() {
        let body = json!({"messages": [{"role": "developer", "content": "x"}]});
        assert_eq!(provider().rewrite_request(body.clone()), body);
    }

    // ── extract_usage_from_response ──────────────────────────────────────

    #[test]
    fn response_usage() {
        let response = json!({
            "stop_reason": "end_turn",
            "usage": {
                "input_tokens": 100,
                "output_tokens": 50,
                "cache_read_input_tokens": 2000,
                "cache_creation_input_tokens": 300,
            }
        });
        let usage = provider().extract_usage_from_response(&response);
        assert_eq!(usage.input_tokens, 100);
        assert_eq!(usage.output_tokens, 50);
        assert_eq!(usage.cache_read_tokens, 2000);
        assert_eq!(usage.cache_write_tokens, 300);
        assert_eq!(usage.stop_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn response_without_usage_is_zero() {
        let usage = provider().extract_usage_from_response(&json!({"type": "error"}));
        assert_eq!(usage, TokenUsage::default());
    }

    #[test]
    fn response_cost_for_sonnet() {
        let p = provider();
        let usage = p.extract_usage_from_response(&json!({
            "usage": {"input_tokens": 1_000_000, "output_tokens": 0}
        }));
        assert!((p.calculate_cost(&usage, "claude-sonnet-4-5") - 3.0).abs() < 1e-9);
    }

    // ── extract_usage_from_stream ────────────────────────────────────────

    #[test]
    fn stream_message_start() {
        let line = r#"data: {"type":"message_start","message":{"usage":{"input_tokens":1200,"cache_read_input_tokens":800,"cache_creation_input_tokens":0}}}"#;
        let f = provider()
            .extract_usage_from_stream(line, Some("message_start"))
            .unwrap();
        assert_eq!(f.input_tokens, Some(1200));
        assert_eq!(f.cache_read_tokens, Some(800));
        assert_eq!(f.cache_write_tokens, Some(0));
        assert_eq!(f.output_tokens, None);
    }

    #[test]
    fn stream_message_start_defaults_missing_counts() {
        let line = r#"data: {"message":{"usage":{"input_tokens":5}}}"#;
        let f = provider()
            .extract_usage_from_stream(line, Some("message_start"))
            .unwrap();
        assert_eq!(f.cache_read_tokens, Some(0));
        assert_eq!(f.cache_write_tokens, Some(0));
    }

    #[test]
    fn stream_message_start_with_empty_usage() {
        let line = r#"data: {"message":{"usage":{}}}"#;
        assert!(provider()
            .extract_usage_from_stream(line, Some("message_start"))
            .is_none());
    }

    #[test]
    fn stream_message_delta() {
        let line = r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":350}}"#;
        let f = provider()
            .extract_usage_from_stream(line, Some("message_delta"))
            .unwrap();
        assert_eq!(f.output_tokens, Some(350));
        assert_eq!(f.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(f.input_tokens, None);
    }

    #[test]
    fn stream_message_delta_zero_output_is_reported() {
        let line = r#"data: {"delta":{},"usage":{"output_tokens":0}}"#;
        let f = provider()
            .extract_usage_from_stream(line, Some("message_delta"))
            .unwrap();
        assert_eq!(f.output_tokens, Some(0));
        assert_eq!(f.stop_reason, None);
    }

    #[test]
    fn stream_requires_event_kind() {
        let line = r#"data: {"type":"message_delta","usage":{"output_tokens":9}}"#;
        assert!(provider().extract_usage_from_stream(line, None).is_none());
        assert!(provider()
            .extract_usage_from_stream(line, Some("content_block_delta"))
            .is_none());
    }

    #[test]
    fn stream_ignores_non_data_and_garbage() {
        let p = provider();
        assert!(p.extract_usage_from_stream("event: message_start", None).is_none());
        assert!(p.extract_usage_from_stream("data: [DONE]", Some("message_delta")).is_none());
        assert!(p.extract_usage_from_stream("data: {oops", Some("message_delta")).is_none());
        assert!(p.extract_usage_from_stream("", Some("message_delta")).is_none());
    }

    // ── auth_headers ─────────────────────────────────────────────────────

    #[test]
    fn auth_headers_forwarded() {
        let mut inbound = HeaderMap::new();
        let mixed_case = HeaderName::from_bytes(b"X-Api-Key").unwrap();
        let _ = inbound.insert(mixed_case, HeaderValue::from_static("sk-ant"));
        let _ = inbound.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
        let _ = inbound.insert("anthropic-beta", HeaderValue::from_static(""));
        let _ = inbound.insert("authorization", HeaderValue::from_static("Bearer x"));

        let out = provider().auth_headers(&inbound);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get("x-api-key").unwrap(), "sk-ant");
        assert_eq!(out.get("anthropic-version").unwrap(), "2023-06-01");
        assert!(out.get("authorization").is_none());
    }

    #[test]
    fn http_client_is_cached() {
        let p = provider();
        let _ = p.http_client().unwrap();
        assert!(p.client.is_built());
    }
}
