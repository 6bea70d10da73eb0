//! Subcommand handlers. Each returns the JSON value to print.

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tokenspy_providers::{ExchangeRecorder, ProviderRegistry};
use tokenspy_settings::TokenSpySettings;
use tokenspy_store::UsageStore;
use tracing::info;

use crate::IngestArgs;

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Registered providers with their effective upstream URLs.
pub fn providers(registry: &ProviderRegistry, settings: &TokenSpySettings) -> Result<Value> {
    let mut out = Vec::new();
    for name in registry.list() {
        let provider = registry.get_configured(&name, settings)?;
        out.push(json!({
            "name": provider.name(),
            "base_url": provider.base_url(),
            "api_endpoint": provider.api_endpoint(),
            "upstream_url": provider.upstream_url(),
        }));
    }
    Ok(Value::Array(out))
}

/// Rate quadruple for `model` under `provider`.
pub fn pricing(
    registry: &ProviderRegistry,
    settings: &TokenSpySettings,
    provider: &str,
    model: &str,
) -> Result<Value> {
    let provider = registry.get_configured(provider, settings)?;
    Ok(json!({
        "provider": provider.name(),
        "model": model,
        "pricing": provider.pricing(model),
    }))
}

/// Request metrics for a body file, optionally with the rewritten body.
pub fn analyze(
    registry: &ProviderRegistry,
    settings: &TokenSpySettings,
    provider: &str,
    request: &Path,
    rewrite: bool,
) -> Result<Value> {
    let provider = registry.get_configured(provider, settings)?;
    let body = read_json(request)?;
    if !body.is_object() {
        bail!("{} does not contain a JSON object", request.display());
    }

    let metrics = provider.analyze_request(&body);
    let mut out = json!({
        "provider": provider.name(),
        "metrics": metrics,
    });
    if rewrite {
        out["rewritten"] = provider.rewrite_request(body);
    }
    Ok(out)
}

/// Build a record from captured request and response files and store it.
pub fn ingest(
    registry: &ProviderRegistry,
    settings: &TokenSpySettings,
    store: &dyn UsageStore,
    args: &IngestArgs,
) -> Result<Value> {
    let provider = registry.get_configured(&args.provider, settings)?;
    let body = std::fs::read(&args.request)
        .with_context(|| format!("Failed to read {}", args.request.display()))?;
    let (mut recorder, _) = ExchangeRecorder::begin(provider, args.agent.as_str(), &body)
        .with_context(|| format!("Failed to analyze {}", args.request.display()))?;

    if args.stream {
        let transcript = std::fs::read_to_string(&args.response)
            .with_context(|| format!("Failed to read {}", args.response.display()))?;
        for line in transcript.lines() {
            recorder.on_stream_line(line);
        }
    } else {
        recorder.on_response(&read_json(&args.response)?);
    }

    let record = match args.duration_ms {
        Some(ms) => recorder.finish_with_duration(ms),
        None => recorder.finish(),
    };
    let id = store.log_usage(&record).context("Failed to store usage record")?;
    info!(id, agent = %record.agent, provider = %record.provider, "exchange ingested");
    Ok(json!({ "id": id, "record": record }))
}

/// Stored records, newest first.
pub fn usage(
    store: &dyn UsageStore,
    agent: Option<&str>,
    hours: u32,
    limit: u32,
) -> Result<Value> {
    let rows = store.query_usage(agent, hours, limit)?;
    Ok(serde_json::to_value(rows)?)
}

/// Per-agent aggregates.
pub fn summary(store: &dyn UsageStore, hours: u32) -> Result<Value> {
    Ok(serde_json::to_value(store.query_summary(hours)?)?)
}

/// Session health for `agent`.
pub fn status(store: &dyn UsageStore, agent: &str, char_limit: u64) -> Result<Value> {
    Ok(serde_json::to_value(store.query_session_status(agent, char_limit)?)?)
}

/// Live-feed rows.
pub fn recent(store: &dyn UsageStore, limit: u32, after_id: Option<i64>) -> Result<Value> {
    Ok(serde_json::to_value(store.query_recent_events(limit, after_id)?)?)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
