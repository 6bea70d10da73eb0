//! Usage data model.
//!
//! A request/response exchange produces three things:
//!
//! 1. [`RequestMetrics`] from analyzing the outbound request body
//! 2. [`UsageFragment`]s from the response (one for a whole response, many
//!    for a stream), merged into a [`TokenUsage`]
//! 3. A cost computed from the resolved usage and the provider's pricing
//!
//! [`UsageRecord`] combines all three for persistence. Field names match the
//! `usage` table columns so records serialize flat.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Workspace sections
// ─────────────────────────────────────────────────────────────────────────────

/// Named system-prompt sections tracked separately for size attribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceSection {
    /// `AGENTS.md`
    Agents,
    /// `SOUL.md`
    Soul,
    /// `TOOLS.md`
    Tools,
    /// `IDENTITY.md`
    Identity,
    /// `USER.md`
    User,
    /// `HEARTBEAT.md`
    Heartbeat,
    /// `BOOTSTRAP.md`
    Bootstrap,
    /// `MEMORY.md`
    Memory,
}

impl WorkspaceSection {
    /// All sections in match-priority order. The first section whose heading
    /// appears in a block claims that block.
    pub const ALL: [Self; 8] = [
        Self::Agents,
        Self::Soul,
        Self::Tools,
        Self::Identity,
        Self::User,
        Self::Heartbeat,
        Self::Bootstrap,
        Self::Memory,
    ];

    /// File name used in the section heading (e.g. `"SOUL.md"`).
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Agents => "AGENTS.md",
            Self::Soul => "SOUL.md",
            Self::Tools => "TOOLS.md",
            Self::Identity => "IDENTITY.md",
            Self::User => "USER.md",
            Self::Heartbeat => "HEARTBEAT.md",
            Self::Bootstrap => "BOOTSTRAP.md",
            Self::Memory => "MEMORY.md",
        }
    }

    /// Storage column / serialized field name for this section's size.
    pub const fn column(self) -> &'static str {
        match self {
            Self::Agents => "workspace_agents_chars",
            Self::Soul => "workspace_soul_chars",
            Self::Tools => "workspace_tools_chars",
            Self::Identity => "workspace_identity_chars",
            Self::User => "workspace_user_chars",
            Self::Heartbeat => "workspace_heartbeat_chars",
            Self::Bootstrap => "workspace_bootstrap_chars",
            Self::Memory => "workspace_memory_chars",
        }
    }

    /// Whether `text` carries this section's heading (`# NAME` or `## NAME`).
    pub fn heading_in(self, text: &str) -> bool {
        let name = self.file_name();
        text.contains(&format!("## {name}")) || text.contains(&format!("# {name}"))
    }

    /// First section (in [`Self::ALL`] order) whose heading appears in `text`.
    pub fn detect(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|section| section.heading_in(text))
    }
}

/// Per-section character counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceChars {
    /// Characters attributed to `AGENTS.md`.
    #[serde(rename = "workspace_agents_chars", default)]
    pub agents: u64,
    /// Characters attributed to `SOUL.md`.
    #[serde(rename = "workspace_soul_chars", default)]
    pub soul: u64,
    /// Characters attributed to `TOOLS.md`.
    #[serde(rename = "workspace_tools_chars", default)]
    pub tools: u64,
    /// Characters attributed to `IDENTITY.md`.
    #[serde(rename = "workspace_identity_chars", default)]
    pub identity: u64,
    /// Characters attributed to `USER.md`.
    #[serde(rename = "workspace_user_chars", default)]
    pub user: u64,
    /// Characters attributed to `HEARTBEAT.md`.
    #[serde(rename = "workspace_heartbeat_chars", default)]
    pub heartbeat: u64,
    /// Characters attributed to `BOOTSTRAP.md`.
    #[serde(rename = "workspace_bootstrap_chars", default)]
    pub bootstrap: u64,
    /// Characters attributed to `MEMORY.md`.
    #[serde(rename = "workspace_memory_chars", default)]
    pub memory: u64,
}

impl WorkspaceChars {
    /// Characters attributed to `section`.
    pub fn get(&self, section: WorkspaceSection) -> u64 {
        match section {
            WorkspaceSection::Agents => self.agents,
            WorkspaceSection::Soul => self.soul,
            WorkspaceSection::Tools => self.tools,
            WorkspaceSection::Identity => self.identity,
            WorkspaceSection::User => self.user,
            WorkspaceSection::Heartbeat => self.heartbeat,
            WorkspaceSection::Bootstrap => self.bootstrap,
            WorkspaceSection::Memory => self.memory,
        }
    }

    /// Add `chars` to `section`.
    pub fn add(&mut self, section: WorkspaceSection, chars: u64) {
        let slot = match section {
            WorkspaceSection::Agents => &mut self.agents,
            WorkspaceSection::Soul => &mut self.soul,
            WorkspaceSection::Tools => &mut self.tools,
            WorkspaceSection::Identity => &mut self.identity,
            WorkspaceSection::User => &mut self.user,
            WorkspaceSection::Heartbeat => &mut self.heartbeat,
            WorkspaceSection::Bootstrap => &mut self.bootstrap,
            WorkspaceSection::Memory => &mut self.memory,
        };
        *slot = slot.saturating_add(chars);
    }

    /// Sum over all sections, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        WorkspaceSection::ALL
            .iter()
            .fold(0, |acc, s| acc.saturating_add(self.get(*s)))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Size and structure metrics extracted from an outbound request body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestMetrics {
    /// Total messages in the conversation.
    pub message_count: u64,
    /// Messages with role `user`.
    pub user_message_count: u64,
    /// Messages with role `assistant`.
    pub assistant_message_count: u64,
    /// Declared tool / function definitions.
    pub tool_count: u64,
    /// Characters across the whole system prompt.
    pub system_prompt_total_chars: u64,
    /// Per-section breakdown of the system prompt.
    #[serde(flatten)]
    pub workspace: WorkspaceChars,
    /// Characters of injected skill content. Providers leave this at zero.
    pub skill_injection_chars: u64,
    /// System-prompt characters not attributed to any workspace section.
    pub base_prompt_chars: u64,
    /// Characters in the compact JSON serialization of the message list.
    pub conversation_history_chars: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Token usage
// ─────────────────────────────────────────────────────────────────────────────

/// Usage reported by one response or one stream frame.
///
/// Every field is optional: a frame reports only what it knows. Fragments
/// merge last-write-wins per field; values are never summed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageFragment {
    /// Input (prompt) tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Output (completion) tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    /// Tokens served from the provider-side prompt cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_read_tokens: Option<u64>,
    /// Tokens written to the provider-side prompt cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_write_tokens: Option<u64>,
    /// Why generation stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

impl UsageFragment {
    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none()
            && self.output_tokens.is_none()
            && self.cache_read_tokens.is_none()
            && self.cache_write_tokens.is_none()
            && self.stop_reason.is_none()
    }

    /// `Some(self)` when at least one field is set.
    pub fn non_empty(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }

    /// Overwrite each field that `later` carries. Absent fields are left alone.
    pub fn merge(&mut self, later: Self) {
        if later.input_tokens.is_some() {
            self.input_tokens = later.input_tokens;
        }
        if later.output_tokens.is_some() {
            self.output_tokens = later.output_tokens;
        }
        if later.cache_read_tokens.is_some() {
            self.cache_read_tokens = later.cache_read_tokens;
        }
        if later.cache_write_tokens.is_some() {
            self.cache_write_tokens = later.cache_write_tokens;
        }
        if later.stop_reason.is_some() {
            self.stop_reason = later.stop_reason;
        }
    }

    /// Resolve into concrete counts, defaulting unreported fields to zero.
    pub fn resolve(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens.unwrap_or(0),
            output_tokens: self.output_tokens.unwrap_or(0),
            cache_read_tokens: self.cache_read_tokens.unwrap_or(0),
            cache_write_tokens: self.cache_write_tokens.unwrap_or(0),
            stop_reason: self.stop_reason.clone(),
        }
    }
}

/// Resolved token usage for one exchange.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    /// Input (prompt) tokens.
    pub input_tokens: u64,
    /// Output (completion) tokens.
    pub output_tokens: u64,
    /// Cache-read tokens.
    pub cache_read_tokens: u64,
    /// Cache-write tokens.
    pub cache_write_tokens: u64,
    /// Why generation stopped, if reported.
    pub stop_reason: Option<String>,
}

impl TokenUsage {
    /// Input plus output tokens, saturating at `u64::MAX`.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl From<TokenUsage> for UsageFragment {
    /// A whole-response usage reports every count, so every field is set.
    fn from(usage: TokenUsage) -> Self {
        Self {
            input_tokens: Some(usage.input_tokens),
            output_tokens: Some(usage.output_tokens),
            cache_read_tokens: Some(usage.cache_read_tokens),
            cache_write_tokens: Some(usage.cache_write_tokens),
            stop_reason: usage.stop_reason,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage record
// ─────────────────────────────────────────────────────────────────────────────

/// One measured request/response exchange, ready for persistence.
///
/// Immutable once built. The timestamp is assigned by the store at write
/// time, so freshly built records carry `None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Agent that issued the request.
    pub agent: String,
    /// Provider name (`anthropic`, `openai`, ...). Empty means "detect from model".
    #[serde(default)]
    pub provider: String,
    /// Model name as sent upstream.
    pub model: String,
    /// Size of the request body in bytes.
    #[serde(default)]
    pub request_body_bytes: u64,
    /// Request-side metrics.
    #[serde(flatten)]
    pub metrics: RequestMetrics,
    /// Response-side token usage.
    #[serde(flatten)]
    pub usage: TokenUsage,
    /// Estimated cost in USD.
    #[serde(default)]
    pub estimated_cost_usd: f64,
    /// Wall-clock duration of the exchange.
    #[serde(default)]
    pub duration_ms: u64,
    /// Write timestamp (`YYYY-MM-DDTHH:MM:SS.fffZ`), set by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
