//! Usage repository: writes and reads for the `usage` table.
//!
//! Timestamps are `YYYY-MM-DDTHH:MM:SS.fffZ` strings, so lexical order is
//! chronological order and time filters bind a formatted cutoff.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row, params};
use tokenspy_analytics::SessionSample;
use tokenspy_core::{RequestMetrics, TokenUsage, UsageRecord, WorkspaceChars};
use tokenspy_providers::detect_vendor;

use crate::errors::{Result, StoreError};
use crate::sqlite::row_types::{AgentSummary, RecentEvent, StoredUsage};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

const RECORD_COLUMNS: &str = "id, timestamp, agent, provider, model,
     request_body_bytes, message_count, user_message_count, assistant_message_count, tool_count,
     system_prompt_total_chars,
     workspace_agents_chars, workspace_soul_chars, workspace_tools_chars,
     workspace_identity_chars, workspace_user_chars, workspace_heartbeat_chars,
     workspace_bootstrap_chars, workspace_memory_chars,
     skill_injection_chars, base_prompt_chars, conversation_history_chars,
     input_tokens, output_tokens, cache_read_tokens, cache_write_tokens,
     estimated_cost_usd, duration_ms, stop_reason";

/// Format an instant the way the `timestamp` column stores it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time in storage format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Lower bound for a trailing window of `hours`.
pub fn cutoff(hours: u32) -> String {
    let at = Utc::now()
        .checked_sub_signed(Duration::hours(i64::from(hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    format_timestamp(at)
}

/// Usage repository, stateless. Every method takes `&Connection`.
pub struct UsageRepo;

impl UsageRepo {
    /// Insert `record` stamped with `timestamp`. Returns the new row id.
    ///
    /// The record's own `timestamp` is ignored. An empty provider is filled
    /// from the model name.
    pub fn insert(conn: &Connection, record: &UsageRecord, timestamp: &str) -> Result<i64> {
        if record.agent.is_empty() {
            return Err(StoreError::InvalidArgument("agent must not be empty".into()));
        }
        let provider = if record.provider.is_empty() {
            detect_vendor(&record.model)
        } else {
            record.provider.as_str()
        };
        let m = &record.metrics;
        let w = &m.workspace;
        let u = &record.usage;

        let _ = conn.execute(
            "INSERT INTO usage (timestamp, agent, provider, model,
                 request_body_bytes, message_count, user_message_count,
                 assistant_message_count, tool_count, system_prompt_total_chars,
                 workspace_agents_chars, workspace_soul_chars, workspace_tools_chars,
                 workspace_identity_chars, workspace_user_chars, workspace_heartbeat_chars,
                 workspace_bootstrap_chars, workspace_memory_chars,
                 skill_injection_chars, base_prompt_chars, conversation_history_chars,
                 input_tokens, output_tokens, cache_read_tokens, cache_write_tokens,
                 estimated_cost_usd, duration_ms, stop_reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)",
            params![
                timestamp,
                record.agent,
                provider,
                record.model,
                to_int(record.request_body_bytes),
                to_int(m.message_count),
                to_int(m.user_message_count),
                to_int(m.assistant_message_count),
                to_int(m.tool_count),
                to_int(m.system_prompt_total_chars),
                to_int(w.agents),
                to_int(w.soul),
                to_int(w.tools),
                to_int(w.identity),
                to_int(w.user),
                to_int(w.heartbeat),
                to_int(w.bootstrap),
                to_int(w.memory),
                to_int(m.skill_injection_chars),
                to_int(m.base_prompt_chars),
                to_int(m.conversation_history_chars),
                to_int(u.input_tokens),
                to_int(u.output_tokens),
                to_int(u.cache_read_tokens),
                to_int(u.cache_write_tokens),
                record.estimated_cost_usd,
                to_int(record.duration_ms),
                u.stop_reason,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Rows newer than `since`, newest first, optionally for one agent.
    pub fn list(
        conn: &Connection,
        agent: Option<&str>,
        since: &str,
        limit: u32,
    ) -> Result<Vec<StoredUsage>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM usage
             WHERE timestamp > ?1 AND (?2 IS NULL OR agent = ?2)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![since, agent, i64::from(limit)], Self::map_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Per-agent aggregates over rows newer than `since`, ordered by agent.
    pub fn summary(conn: &Connection, since: &str) -> Result<Vec<AgentSummary>> {
        let mut stmt = conn.prepare(
            "SELECT agent,
                    COUNT(*),
                    SUM(input_tokens),
                    SUM(output_tokens),
                    SUM(cache_read_tokens),
                    SUM(cache_write_tokens),
                    SUM(estimated_cost_usd),
                    AVG(input_tokens),
                    MAX(input_tokens),
                    AVG(system_prompt_total_chars),
                    AVG(conversation_history_chars),
                    AVG(skill_injection_chars),
                    AVG(base_prompt_chars)
             FROM usage
             WHERE timestamp > ?1
             GROUP BY agent
             ORDER BY agent",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok(AgentSummary {
                    agent: row.get(0)?,
                    turns: count_at(row, 1)?,
                    total_input_tokens: count_at(row, 2)?,
                    total_output_tokens: count_at(row, 3)?,
                    total_cache_read: count_at(row, 4)?,
                    total_cache_write: count_at(row, 5)?,
                    total_cost: real_at(row, 6)?,
                    avg_input_tokens: real_at(row, 7)?,
                    max_input_tokens: count_at(row, 8)?,
                    avg_system_chars: real_at(row, 9)?,
                    avg_history_chars: real_at(row, 10)?,
                    avg_skill_chars: real_at(row, 11)?,
                    avg_base_prompt_chars: real_at(row, 12)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// An agent's samples newer than `since`, oldest first.
    pub fn session_samples(
        conn: &Connection,
        agent: &str,
        since: &str,
    ) -> Result<Vec<SessionSample>> {
        let mut stmt = conn.prepare(
            "SELECT conversation_history_chars, cache_read_tokens, cache_write_tokens,
                    estimated_cost_usd, timestamp
             FROM usage
             WHERE agent = ?1 AND timestamp > ?2
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt
            .query_map(params![agent, since], |row| {
                Ok(SessionSample {
                    conversation_history_chars: count_at(row, 0)?,
                    cache_read_tokens: count_at(row, 1)?,
                    cache_write_tokens: count_at(row, 2)?,
                    estimated_cost_usd: real_at(row, 3)?,
                    timestamp: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Latest rows for a live feed, newest first. With `after_id`, only
    /// rows with a larger id are returned.
    pub fn recent(
        conn: &Connection,
        limit: u32,
        after_id: Option<i64>,
    ) -> Result<Vec<RecentEvent>> {
        let mut stmt = conn.prepare(
            "SELECT id, agent, provider, model, input_tokens, output_tokens,
                    estimated_cost_usd, timestamp
             FROM usage
             WHERE (?1 IS NULL OR id > ?1)
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![after_id, i64::from(limit)], |row| {
                let input_tokens = count_at(row, 4)?;
                let output_tokens = count_at(row, 5)?;
                Ok(RecentEvent {
                    id: row.get(0)?,
                    agent_name: row.get(1)?,
                    provider: row.get(2)?,
                    model: row.get(3)?,
                    input_tokens,
                    output_tokens,
                    total_tokens: input_tokens.saturating_add(output_tokens),
                    cost_usd: real_at(row, 6)?,
                    timestamp: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Total rows in the table.
    pub fn count(conn: &Connection) -> Result<u64> {
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM usage", [], |row| row.get(0))?;
        Ok(from_int(Some(n)))
    }

    /// Map a row selected with `RECORD_COLUMNS`.
    fn map_record(row: &Row<'_>) -> rusqlite::Result<StoredUsage> {
        Ok(StoredUsage {
            id: row.get(0)?,
            record: UsageRecord {
                timestamp: Some(row.get(1)?),
                agent: row.get(2)?,
                provider: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                model: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                request_body_bytes: count_at(row, 5)?,
                metrics: RequestMetrics {
                    message_count: count_at(row, 6)?,
                    user_message_count: count_at(row, 7)?,
                    assistant_message_count: count_at(row, 8)?,
                    tool_count: count_at(row, 9)?,
                    system_prompt_total_chars: count_at(row, 10)?,
                    workspace: WorkspaceChars {
                        agents: count_at(row, 11)?,
                        soul: count_at(row, 12)?,
                        tools: count_at(row, 13)?,
                        identity: count_at(row, 14)?,
                        user: count_at(row, 15)?,
                        heartbeat: count_at(row, 16)?,
                        bootstrap: count_at(row, 17)?,
                        memory: count_at(row, 18)?,
                    },
                    skill_injection_chars: count_at(row, 19)?,
                    base_prompt_chars: count_at(row, 20)?,
                    conversation_history_chars: count_at(row, 21)?,
                },
                usage: TokenUsage {
                    input_tokens: count_at(row, 22)?,
                    output_tokens: count_at(row, 23)?,
                    cache_read_tokens: count_at(row, 24)?,
                    cache_write_tokens: count_at(row, 25)?,
                    stop_reason: row.get(28)?,
                },
                estimated_cost_usd: real_at(row, 26)?,
                duration_ms: count_at(row, 27)?,
            },
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

fn to_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_int(value: Option<i64>) -> u64 {
    value.and_then(|v| u64::try_from(v).ok()).unwrap_or(0)
}

fn count_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(from_int(row.get(idx)?))
}

fn real_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<f64> {
    Ok(row.get::<_, Option<f64>>(idx)?.unwrap_or(0.0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
