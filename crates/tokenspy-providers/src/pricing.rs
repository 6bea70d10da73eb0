//! Model pricing tables and cost calculation.
//!
//! Each protocol family owns an immutable table mapping a model-name pattern
//! to a per-million-token rate quadruple. Lookup is by substring: keys are
//! tried longest first and the first key contained anywhere in the
//! lower-cased model name wins. Unknown models price at zero.

use serde::Serialize;
use tokenspy_core::TokenUsage;

/// Rates in USD per million tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ModelPricing {
    /// Fresh input tokens.
    pub input: f64,
    /// Output tokens.
    pub output: f64,
    /// Cache-read tokens.
    pub cache_read: f64,
    /// Cache-write tokens.
    pub cache_write: f64,
}

impl ModelPricing {
    /// All-zero pricing for unknown or free models.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    /// Construct a rate quadruple.
    pub const fn new(input: f64, output: f64, cache_read: f64, cache_write: f64) -> Self {
        Self {
            input,
            output,
            cache_read,
            cache_write,
        }
    }

    /// Cost of `usage` at these rates.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Token counts never approach 2^52
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        usage.input_tokens as f64 * self.input / 1_000_000.0
            + usage.output_tokens as f64 * self.output / 1_000_000.0
            + usage.cache_read_tokens as f64 * self.cache_read / 1_000_000.0
            + usage.cache_write_tokens as f64 * self.cache_write / 1_000_000.0
    }
}

/// Immutable pattern → pricing table.
#[derive(Clone, Copy, Debug)]
pub struct PricingTable {
    entries: &'static [(&'static str, ModelPricing)],
}

impl PricingTable {
    /// Wrap a static entry list. Keys must be lower-case.
    pub const fn new(entries: &'static [(&'static str, ModelPricing)]) -> Self {
        Self { entries }
    }

    /// Resolve pricing for `model` by longest contained key.
    ///
    /// Keys of equal length keep their table order.
    pub fn lookup(&self, model: &str) -> ModelPricing {
        self.find(model)
            .map_or(ModelPricing::ZERO, |(_, pricing)| pricing)
    }

    /// Key that [`lookup`](Self::lookup) would match, if any.
    pub fn matching_key(&self, model: &str) -> Option<&'static str> {
        self.find(model).map(|(key, _)| key)
    }

    // Single pass; strict `>` keeps the earlier of equal-length keys.
    fn find(&self, model: &str) -> Option<(&'static str, ModelPricing)> {
        let model = model.to_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| model.contains(key))
            .reduce(|best, entry| if entry.0.len() > best.0.len() { entry } else { best })
            .copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tables
// ─────────────────────────────────────────────────────────────────────────────

/// Anthropic Messages API models.
pub const ANTHROPIC_PRICING: PricingTable = PricingTable::new(&[
    ("claude-opus-4-6", ModelPricing::new(5.0, 25.0, 0.50, 6.25)),
    ("claude-opus-4-5", ModelPricing::new(5.0, 25.0, 0.50, 6.25)),
    ("claude-opus-4-1", ModelPricing::new(15.0, 75.0, 1.50, 18.75)),
    ("claude-opus-4", ModelPricing::new(15.0, 75.0, 1.50, 18.75)),
    ("claude-sonnet-4", ModelPricing::new(3.0, 15.0, 0.30, 3.75)),
    ("claude-haiku-4-5", ModelPricing::new(1.0, 5.0, 0.10, 1.25)),
    ("claude-haiku-3-5", ModelPricing::new(0.80, 4.0, 0.08, 1.0)),
    ("claude-haiku", ModelPricing::new(0.80, 4.0, 0.08, 1.0)),
]);

/// `OpenAI`-compatible models (`OpenAI`, Moonshot Kimi, `DeepSeek`, local).
pub const OPENAI_PRICING: PricingTable = PricingTable::new(&[
    // Moonshot Kimi
    ("kimi-k2-0711", ModelPricing::new(0.60, 3.0, 0.10, 0.60)),
    ("kimi-k2-0905", ModelPricing::new(0.60, 2.50, 0.15, 0.60)),
    ("kimi-k2-thinking", ModelPricing::new(0.60, 2.50, 0.15, 0.60)),
    ("kimi-k2.5", ModelPricing::new(0.60, 2.50, 0.15, 0.60)),
    ("kimi-k2", ModelPricing::new(0.60, 2.50, 0.15, 0.60)),
    // OpenAI
    ("gpt-4o", ModelPricing::new(2.50, 10.0, 1.25, 0.0)),
    ("gpt-4o-mini", ModelPricing::new(0.15, 0.60, 0.075, 0.0)),
    ("gpt-4-turbo", ModelPricing::new(10.0, 30.0, 0.0, 0.0)),
    ("gpt-4", ModelPricing::new(30.0, 60.0, 0.0, 0.0)),
    ("gpt-3.5-turbo", ModelPricing::new(0.50, 1.50, 0.0, 0.0)),
    ("o1", ModelPricing::new(15.0, 60.0, 7.50, 0.0)),
    ("o1-mini", ModelPricing::new(3.0, 12.0, 1.50, 0.0)),
    ("o1-pro", ModelPricing::new(150.0, 600.0, 0.0, 0.0)),
    // DeepSeek
    ("deepseek-chat", ModelPricing::new(0.27, 1.10, 0.07, 0.27)),
    ("deepseek-reasoner", ModelPricing::new(0.55, 2.19, 0.14, 0.55)),
    // Local families
    ("qwen", ModelPricing::ZERO),
    ("llama", ModelPricing::ZERO),
    ("mistral", ModelPricing::ZERO),
]);

/// Guess the vendor from a model name.
///
/// Used to fill the provider column when a caller records usage without
/// naming the provider.
#[must_use]
pub fn detect_vendor(model: &str) -> &'static str {
    let m = model.to_lowercase();
    if m.contains("claude") {
        "anthropic"
    } else if m.contains("kimi") {
        "moonshot"
    } else if m.contains("gpt") || m.contains("o1") {
        "openai"
    } else if m.contains("gemini") {
        "google"
    } else if m.contains("qwen") {
        "alibaba"
    } else {
        "unknown"
    }
}

/// Format a cost value for display.
///
/// Uses 6 decimal places under $0.01, 4 otherwise.
#[must_use]
pub fn format_cost(cost: f64) -> String {
    if cost < 0.01 {
        format!("${cost:.6}")
    } else {
        format!("${cost:.4}")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
