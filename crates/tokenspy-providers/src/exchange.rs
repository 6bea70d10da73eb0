//! Assembles one request/response exchange into a [`UsageRecord`].
//!
//! ```text
//! begin(body) ──► analyze_request ──► rewrite_request ──► (caller forwards)
//!                                                          │
//!        on_response(json)  or  on_stream_line(line) × N ◄─┘
//!                                                          │
//!                            finish() ──► UsageRecord (with cost)
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokenspy_core::{RequestMetrics, UsageFragment, UsageRecord};
use tracing::debug;

use crate::accumulator::StreamUsageAccumulator;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::sse::SseFrame;

/// Model name recorded when the request body names none.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Tracks one exchange from request to finished record.
#[derive(Debug)]
pub struct ExchangeRecorder {
    provider: Arc<dyn Provider>,
    agent: String,
    model: String,
    request_body_bytes: u64,
    metrics: RequestMetrics,
    usage: StreamUsageAccumulator,
    started: Instant,
}

impl ExchangeRecorder {
    /// Parse and analyze a request body.
    ///
    /// Returns the recorder and the rewritten body to forward upstream.
    pub fn begin(
        provider: Arc<dyn Provider>,
        agent: impl Into<String>,
        body: &[u8],
    ) -> ProviderResult<(Self, Value)> {
        let parsed: Value = serde_json::from_slice(body)?;
        if !parsed.is_object() {
            return Err(ProviderError::InvalidRequest {
                message: "request body must be a JSON object".into(),
            });
        }

        let model = parsed
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .unwrap_or(UNKNOWN_MODEL)
            .to_string();
        let metrics = provider.analyze_request(&parsed);
        let rewritten = provider.rewrite_request(parsed);

        let recorder = Self {
            provider,
            agent: agent.into(),
            model,
            request_body_bytes: body.len() as u64,
            metrics,
            usage: StreamUsageAccumulator::new(),
            started: Instant::now(),
        };
        Ok((recorder, rewritten))
    }

    /// Record usage from a complete JSON response.
    pub fn on_response(&mut self, response: &Value) {
        let usage = self.provider.extract_usage_from_response(response);
        self.usage.feed(UsageFragment::from(usage));
    }

    /// Record usage from one raw stream line.
    pub fn on_stream_line(&mut self, line: &str) {
        self.usage.feed_line(self.provider.as_ref(), line);
    }

    /// Record usage from one parsed SSE frame.
    pub fn on_stream_frame(&mut self, frame: &SseFrame) {
        self.usage.feed_frame(self.provider.as_ref(), frame);
    }

    /// Model named by the request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request-side metrics.
    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }

    /// Provider handling this exchange.
    pub fn provider(&self) -> &dyn Provider {
        self.provider.as_ref()
    }

    /// Finish, timing the exchange from [`begin`](Self::begin).
    pub fn finish(self) -> UsageRecord {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.finish_with_duration(elapsed)
    }

    /// Finish with an externally measured duration.
    pub fn finish_with_duration(self, duration_ms: u64) -> UsageRecord {
        let usage = self.usage.finish();
        let estimated_cost_usd = self.provider.calculate_cost(&usage, &self.model);
        debug!(
            provider = self.provider.name(),
            agent = %self.agent,
            model = %self.model,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            cost = estimated_cost_usd,
            "exchange finished"
        );

        UsageRecord {
            agent: self.agent,
            provider: self.provider.name().to_string(),
            model: self.model,
            request_body_bytes: self.request_body_bytes,
            metrics: self.metrics,
            usage,
            estimated_cost_usd,
            duration_ms,
            timestamp: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
