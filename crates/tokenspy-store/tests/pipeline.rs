//! End-to-end: request analysis, stream accumulation, record assembly,
//! persistence, and session status.

use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tokenspy_analytics::Recommendation;
use tokenspy_providers::{ExchangeRecorder, ProviderRegistry, parse_sse_frames};
use tokenspy_store::{ConnectionConfig, SqliteUsageStore, UsageStore};

fn anthropic_request(history_text: &str) -> Vec<u8> {
    json!({
        "model": "claude-sonnet-4-5",
        "system": [
            {"type": "text", "text": "## SOUL.md\nbe kind"},
            {"type": "text", "text": "plain instructions", "cache_control": {"type": "ephemeral"}},
        ],
        "messages": [
            {"role": "user", "content": history_text},
            {"role": "assistant", "content": "ok"},
            {"role": "user", "content": "next"},
        ],
        "tools": [{"name": "read"}, {"name": "write"}],
        "stream": true,
    })
    .to_string()
    .into_bytes()
}

const ANTHROPIC_STREAM: &str = "event: message_start\n\
data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":1000000,\"cache_read_input_tokens\":0,\"cache_creation_input_tokens\":0}}}\n\
\n\
event: content_block_delta\n\
data: {\"type\":\"content_block_delta\",\"delta\":{\"text\":\"hi\"}}\n\
\n\
event: ping\n\
data: not-json\n\
\n\
event: message_delta\n\
data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":100000}}\n\
\n\
event: message_stop\n\
data: {\"type\":\"message_stop\"}\n\n";

#[tokio::test]
async fn anthropic_stream_to_status() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteUsageStore::open(dir.path().join("usage.db"), &ConnectionConfig::default())
        .unwrap();
    let registry = ProviderRegistry::with_builtins();
    let provider = registry.get("anthropic", None).unwrap();

    let body = anthropic_request("first question");
    let (mut recorder, forwarded) =
        ExchangeRecorder::begin(provider, "alpha", &body).unwrap();
    assert_eq!(forwarded["stream"], true);

    // Split mid-line to exercise reassembly.
    let (head, tail) = ANTHROPIC_STREAM.split_at(97);
    let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
        Ok(Bytes::from(head.to_string())),
        Ok(Bytes::from(tail.to_string())),
    ];
    let mut frames = Box::pin(parse_sse_frames(futures::stream::iter(chunks)));
    while let Some(frame) = frames.next().await {
        recorder.on_stream_frame(&frame);
    }

    let record = recorder.finish_with_duration(2_000);
    assert_eq!(record.usage.input_tokens, 1_000_000);
    assert_eq!(record.usage.output_tokens, 100_000);
    assert_eq!(record.usage.stop_reason.as_deref(), Some("end_turn"));
    assert!((record.estimated_cost_usd - 4.5).abs() < 1e-9);
    assert_eq!(record.metrics.tool_count, 2);
    assert_eq!(record.metrics.message_count, 3);
    assert_eq!(record.metrics.workspace.soul, "## SOUL.md\nbe kind".chars().count() as u64);
    assert_eq!(
        record.metrics.base_prompt_chars,
        "plain instructions".chars().count() as u64
    );

    let id = store.log_usage(&record).unwrap();
    let rows = store.query_usage(Some("alpha"), 1, 10).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
    assert_eq!(rows[0].record.provider, "anthropic");
    assert_eq!(rows[0].record.metrics, record.metrics);
    assert_eq!(rows[0].record.usage, record.usage);

    let status = store.query_session_status("alpha", 200_000).unwrap();
    assert_eq!(status.current_session_turns, 1);
    assert!((status.last_turn_cost - 4.5).abs() < 1e-9);
    assert_eq!(status.recommendation, Recommendation::Healthy);
}

#[test]
fn openai_lines_and_json_responses_share_a_store() {
    let store = SqliteUsageStore::in_memory().unwrap();
    let registry = ProviderRegistry::with_builtins();

    // Streamed exchange fed line by line.
    let body = json!({
        "model": "gpt-4o",
        "messages": [
            {"role": "developer", "content": "be brief"},
            {"role": "user", "content": "hello"},
        ],
        "stream": true,
        "stream_options": {"include_usage": true},
    })
    .to_string();
    let (mut recorder, forwarded) = ExchangeRecorder::begin(
        registry.get("openai", None).unwrap(),
        "beta",
        body.as_bytes(),
    )
    .unwrap();
    assert_eq!(forwarded["messages"][0]["role"], "system");
    for line in [
        ": keep-alive",
        r#"data: {"choices":[{"delta":{"content":"hi"}}]}"#,
        "",
        r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#,
        "",
        r#"data: {"choices":[],"usage":{"prompt_tokens":2000,"completion_tokens":100,"prompt_tokens_details":{"cached_tokens":1000}}}"#,
        "",
        "data: [DONE]",
    ] {
        recorder.on_stream_line(line);
    }
    let streamed = recorder.finish();
    assert_eq!(streamed.usage.input_tokens, 2000);
    assert_eq!(streamed.usage.cache_read_tokens, 1000);
    assert_eq!(streamed.usage.stop_reason.as_deref(), Some("stop"));
    let first = store.log_usage(&streamed).unwrap();

    // Non-streamed exchange for a different agent.
    let body = br#"{"model":"kimi-k2.5","messages":[{"role":"user","content":"q"}]}"#;
    let (mut recorder, _) =
        ExchangeRecorder::begin(registry.get("moonshot", None).unwrap(), "gamma", body).unwrap();
    recorder.on_response(&json!({
        "choices": [{"finish_reason": "length"}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20}
    }));
    let second = store.log_usage(&recorder.finish()).unwrap();

    let recent = store.query_recent_events(10, None).unwrap();
    let ids: Vec<i64> = recent.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![second, first]);
    assert_eq!(recent[0].agent_name, "gamma");
    assert_eq!(recent[0].provider.as_deref(), Some("moonshot"));
    assert_eq!(recent[0].total_tokens, 30);

    let summary = store.query_summary(24).unwrap();
    let agents: Vec<&str> = summary.iter().map(|s| s.agent.as_str()).collect();
    assert_eq!(agents, vec!["beta", "gamma"]);
    assert_eq!(summary[0].total_cache_read, 1000);
}

#[test]
fn growing_history_escalates_recommendation() {
    let store = SqliteUsageStore::in_memory().unwrap();
    let provider = ProviderRegistry::with_builtins().get("anthropic", None).unwrap();

    for size in [100, 800, 1_600] {
        let body = anthropic_request(&"x".repeat(size));
        let (mut recorder, _) =
            ExchangeRecorder::begin(std::sync::Arc::clone(&provider), "delta", &body).unwrap();
        recorder.on_response(&json!({"usage": {"input_tokens": 10, "output_tokens": 1}}));
        let _ = store.log_usage(&recorder.finish_with_duration(1)).unwrap();
    }

    let status = store.query_session_status("delta", 200_000).unwrap();
    assert_eq!(status.current_session_turns, 3);
    assert_eq!(status.recommendation, Recommendation::Healthy);

    // Same data against a tiny threshold.
    let status = store.query_session_status("delta", 500).unwrap();
    assert_eq!(status.recommendation, Recommendation::ResetRecommended);
}
