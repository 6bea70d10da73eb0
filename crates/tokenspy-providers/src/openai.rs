//! `OpenAI` Chat Completions provider and compatible services.
//!
//! One implementation serves three registered names that differ only in
//! identity, default base URL, and pricing:
//!
//! | Flavor   | Default base URL          | Pricing            |
//! |----------|---------------------------|--------------------|
//! | openai   | `https://api.openai.com`  | [`OPENAI_PRICING`] |
//! | moonshot | `https://api.moonshot.ai` | [`OPENAI_PRICING`] |
//! | local    | `http://localhost:8000`   | always zero        |
//!
//! Streams carry no event names. Usage arrives in a final chunk (often with
//! empty `choices`) and the finish reason in the last content chunk.

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokenspy_core::text::char_len;
use tokenspy_core::{RequestMetrics, TokenUsage, UsageFragment};

use crate::analysis::{MessageStats, array_len, compact_json_chars, history_chars};
use crate::client::CachedClient;
use crate::fields::{count_or_zero, non_empty_object, non_empty_str};
use crate::pricing::{ModelPricing, OPENAI_PRICING};
use crate::provider::{Provider, ProviderConfig, ProviderResult, forward_headers};
use crate::sse::{extract_sse_data, parse_sse_data};

/// Headers forwarded upstream. Some compatible services take `x-api-key`.
const AUTH_HEADERS: &[&str] = &["authorization", "x-api-key"];

/// Which `OpenAI`-compatible service an instance represents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenAiFlavor {
    /// `OpenAI` itself.
    #[default]
    OpenAi,
    /// Moonshot (Kimi).
    Moonshot,
    /// Local inference server (vLLM, Ollama, ...). Never billed.
    Local,
}

impl OpenAiFlavor {
    /// Registry name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Moonshot => "moonshot",
            Self::Local => "local",
        }
    }

    /// Default base URL.
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com",
            Self::Moonshot => "https://api.moonshot.ai",
            Self::Local => "http://localhost:8000",
        }
    }
}

/// `OpenAI`-compatible provider.
#[derive(Debug, Default)]
pub struct OpenAiCompatibleProvider {
    flavor: OpenAiFlavor,
    config: ProviderConfig,
    client: CachedClient,
}

impl OpenAiCompatibleProvider {
    /// Create a provider of `flavor` with the given configuration.
    #[must_use]
    pub fn new(flavor: OpenAiFlavor, config: ProviderConfig) -> Self {
        Self {
            flavor,
            config,
            client: CachedClient::default(),
        }
    }

    /// The service this instance represents.
    pub fn flavor(&self) -> OpenAiFlavor {
        self.flavor
    }
}

/// Characters of one system/developer message's content.
fn system_content_chars(content: Option<&Value>) -> u64 {
    match content {
        None => 0,
        Some(Value::String(s)) => char_len(s),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .map(|block| match block {
                Value::Object(map) => map.get("text").and_then(Value::as_str).map_or(0, char_len),
                Value::String(s) => char_len(s),
                _ => 0,
            })
            .fold(0, u64::saturating_add),
        Some(other) => compact_json_chars(other),
    }
}

impl Provider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    fn default_base_url(&self) -> &str {
        self.flavor.default_base_url()
    }

    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn api_endpoint(&self) -> &str {
        "/v1/chat/completions"
    }

    fn pricing(&self, model: &str) -> ModelPricing {
        match self.flavor {
            OpenAiFlavor::Local => ModelPricing::ZERO,
            OpenAiFlavor::OpenAi | OpenAiFlavor::Moonshot => OPENAI_PRICING.lookup(model),
        }
    }

    fn analyze_request(&self, body: &Value) -> RequestMetrics {
        let mut metrics = RequestMetrics::default();
        let messages = body.get("messages");
        MessageStats::count(messages).apply(&mut metrics);

        let system_chars: u64 = messages
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter(|msg| {
                matches!(
                    msg.get("role").and_then(Value::as_str),
                    Some("system" | "developer")
                )
            })
            .map(|msg| system_content_chars(msg.get("content")))
            .fold(0, u64::saturating_add);

        // No structured blocks, so nothing is attributed to workspace sections.
        metrics.system_prompt_total_chars = system_chars;
        metrics.base_prompt_chars = system_chars;
        metrics.conversation_history_chars = history_chars(messages);
        metrics.tool_count = match body.get("tools") {
            Some(tools) => array_len(Some(tools)),
            None => array_len(body.get("functions")),
        };
        metrics
    }

    fn rewrite_request(&self, mut body: Value) -> Value {
        if let Some(Value::Array(messages)) = body.get_mut("messages") {
            for message in messages {
                if message.get("role").and_then(Value::as_str) == Some("developer") {
                    message["role"] = Value::from("system");
                }
            }
        }
        body
    }

    fn extract_usage_from_response(&self, response: &Value) -> TokenUsage {
        TokenUsage {
            input_tokens: count_or_zero(response, "/usage/prompt_tokens"),
            output_tokens: count_or_zero(response, "/usage/completion_tokens"),
            cache_read_tokens: count_or_zero(
                response,
                "/usage/prompt_tokens_details/cached_tokens",
            ),
            cache_write_tokens: 0,
            stop_reason: response
                .pointer("/choices/0/finish_reason")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }

    fn extract_usage_from_stream(
        &self,
        line: &str,
        _event_kind: Option<&str>,
    ) -> Option<UsageFragment> {
        let data: Value = parse_sse_data(extract_sse_data(line)?, self.name())?;

        let mut fragment = UsageFragment::default();
        if let Some(usage) = non_empty_object(&data, "/usage") {
            fragment.input_tokens = Some(count_or_zero(usage, "/prompt_tokens"));
            fragment.output_tokens = Some(count_or_zero(usage, "/completion_tokens"));
            if let Some(details) = non_empty_object(usage, "/prompt_tokens_details") {
                fragment.cache_read_tokens = Some(count_or_zero(details, "/cached_tokens"));
            }
        }
        fragment.stop_reason = non_empty_str(&data, "/choices/0/finish_reason");
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
    use reqwest::header::HeaderValue;
    use serde_json::json;

    use super::*;

    fn openai() -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::default()
    }

    fn flavored(flavor: OpenAiFlavor) -> OpenAiCompatibleProvider {
        OpenAiCompatibleProvider::new(flavor, ProviderConfig::default())
    }

    // ── identity ─────────────────────────────────────────────────────────

    #[test]
    fn flavors_differ_in_identity() {
        assert_eq!(openai().name(), "openai");
        assert_eq!(
            flavored(OpenAiFlavor::Moonshot).upstream_url(),
            "https://api.moonshot.ai/v1/chat/completions"
        );
        assert_eq!(flavored(OpenAiFlavor::Local).base_url(), "http://localhost:8000");
    }

    #[test]
    fn local_base_url_override() {
        let p = OpenAiCompatibleProvider::new(
            OpenAiFlavor::Local,
            ProviderConfig::with_base_url("http://gpu-box:8000"),
        );
        assert_eq!(p.upstream_url(), "http://gpu-box:8000/v1/chat/completions");
    }

    // ── pricing ──────────────────────────────────────────────────────────

    #[test]
    fn local_is_always_free() {
        let usage = TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            ..Default::default()
        };
        assert_eq!(flavored(OpenAiFlavor::Local).calculate_cost(&usage, "gpt-4o"), 0.0);
        assert!((openai().calculate_cost(&usage, "gpt-4o") - 12.5).abs() < 1e-9);
    }

    #[test]
    fn moonshot_uses_shared_table() {
        let p = flavored(OpenAiFlavor::Moonshot);
        assert_eq!(p.pricing("kimi-k2-0711-preview").output, 3.0);
    }

    // ── analyze_request ──────────────────────────────────────────────────

    #[test]
    fn analyze_counts_roles_and_system() {
        let body = json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "developer", "content": [
                    {"type": "text", "text": "abc"},
                    "de",
                    {"type": "image_url"},
                    7,
                ]},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": null},
                {"role": "tool", "content": "result"},
            ],
            "tools": [{"type": "function"}],
        });
        let m = openai().analyze_request(&body);
        assert_eq!(m.message_count, 5);
        assert_eq!(m.user_message_count, 1);
        assert_eq!(m.assistant_message_count, 1);
        assert_eq!(m.system_prompt_total_chars, 9 + 3 + 2);
        assert_eq!(m.base_prompt_chars, m.system_prompt_total_chars);
        assert_eq!(m.workspace.total(), 0);
        assert_eq!(m.tool_count, 1);
        assert_eq!(
            m.conversation_history_chars,
            body["messages"].to_string().chars().count() as u64
        );
    }

    #[test]
    fn analyze_system_content_other_shapes() {
        let body = json!({"messages": [
            {"role": "system", "content": {"a": 1}},
            {"role": "system", "content": null},
            {"role": "system"},
        ]});
        // {"a":1} + null + missing
        assert_eq!(openai().analyze_request(&body).system_prompt_total_chars, 7 + 4);
    }

    #[test]
    fn analyze_workspace_heading_stays_in_base() {
        let body = json!({"messages": [{"role": "system", "content": "## SOUL.md\nx"}]});
        let m = openai().analyze_request(&body);
        assert_eq!(m.workspace.soul, 0);
        assert_eq!(m.base_prompt_chars, 12);
    }

    #[test]
    fn analyze_tool_count_falls_back_to_functions() {
        let legacy = json!({"messages": [], "functions": [{}, {}, {}]});
        assert_eq!(openai().analyze_request(&legacy).tool_count, 3);

        let both = json!({"messages": [], "tools": [], "functions": [{}]});
        assert_eq!(openai().analyze_request(&both).tool_count, 0);
    }

    #[test]
    fn analyze_missing_messages() {
        let m = openai().analyze_request(&json!({}));
        assert_eq!(m.message_count, 0);
        assert_eq!(m.conversation_history_chars, 2);
    }

    // ── rewrite_request ──────────────────────────────────────────────────

    #[test]
    fn rewrite_developer_to_system() {
        let body = json!({"messages": [
            {"role": "developer", "content": "x"},
            {"role": "user", "content": "y"},
        ]});
        let out = openai().rewrite_request(body);
        assert_eq!(out["messages"][0]["role"], "system");
        assert_eq!(out["messages"][0]["content"], "x");
        assert_eq!(out["messages"][1]["role"], "user");
    }

    #[test]
    fn rewrite_without_developer_is_identity() {
        let body = json!({"model": "m", "messages": [{"role": "user", "content": "y"}]});
        assert_eq!(openai().rewrite_request(body.clone()), body);
        assert_eq!(openai().rewrite_request(json!({"model": "m"})), json!({"model": "m"}));
    }

    // ── extract_usage_from_response ──────────────────────────────────────

    #[test]
    fn response_usage() {
        let response = json!({
            "choices": [{"finish_reason": "stop"}],
            "usage": {
                "prompt_tokens": 500,
                "completion_tokens": 120,
                "prompt_tokens_details": {"cached_tokens": 256},
            }
        });
        let usage = openai().extract_usage_from_response(&response);
        assert_eq!(usage.input_tokens, 500);
        assert_eq!(usage.output_tokens, 120);
        assert_eq!(usage.cache_read_tokens, 256);
        assert_eq!(usage.cache_write_tokens, 0);
        assert_eq!(usage.stop_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn response_usage_sent_as_floats() {
        let response = json!({
            "usage": {"prompt_tokens": 500.0, "completion_tokens": 120.0}
        });
        let usage = openai().extract_usage_from_response(&response);
        assert_eq!(usage.input_tokens, 500);
        assert_eq!(usage.output_tokens, 120);
    }

    #[test]
    fn response_without_choices() {
        let usage = openai().extract_usage_from_response(&json!({"choices": []}));
        assert_eq!(usage, TokenUsage::default());
    }

    // ── extract_usage_from_stream ────────────────────────────────────────

    #[test]
    fn stream_final_usage_chunk() {
        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":800,"completion_tokens":45,"prompt_tokens_details":{"cached_tokens":512}}}"#;
        let f = openai().extract_usage_from_stream(line, None).unwrap();
        assert_eq!(f.input_tokens, Some(800));
        assert_eq!(f.output_tokens, Some(45));
        assert_eq!(f.cache_read_tokens, Some(512));
        assert_eq!(f.cache_write_tokens, None);
        assert_eq!(f.stop_reason, None);
    }

    #[test]
    fn stream_finish_reason_chunk() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"length"}]}"#;
        let f = openai().extract_usage_from_stream(line, None).unwrap();
        assert_eq!(f.stop_reason.as_deref(), Some("length"));
        assert_eq!(f.input_tokens, None);
    }

    #[test]
    fn stream_content_chunk_has_nothing() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}],"usage":null}"#;
        assert!(openai().extract_usage_from_stream(line, None).is_none());
    }

    #[test]
    fn stream_empty_details_leave_cache_unset() {
        let line = r#"data: {"usage":{"prompt_tokens":3,"prompt_tokens_details":{}}}"#;
        let f = openai().extract_usage_from_stream(line, None).unwrap();
        assert_eq!(f.cache_read_tokens, None);
        assert_eq!(f.output_tokens, Some(0));
    }

    #[test]
    fn stream_done_and_garbage() {
        assert!(openai().extract_usage_from_stream("data: [DONE]", None).is_none());
        assert!(openai().extract_usage_from_stream("data: nope", None).is_none());
        assert!(openai().extract_usage_from_stream(": ping", None).is_none());
    }

    // ── auth_headers ─────────────────────────────────────────────────────

    #[test]
    fn auth_headers_forwarded() {
        let mut inbound = HeaderMap::new();
        let _ = inbound.insert("authorization", HeaderValue::from_static("Bearer sk-1"));
        let _ = inbound.insert("x-api-key", HeaderValue::from_static("k"));
        let _ = inbound.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let out = openai().auth_headers(&inbound);
        assert_eq!(out.len(), 2);
        assert_eq!(out.get("Authorization").unwrap(), "Bearer sk-1");
        assert_eq!(out.get("x-api-key").unwrap(), "k");
    }
}
