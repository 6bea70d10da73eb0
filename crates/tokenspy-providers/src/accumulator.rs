//! Folds a stream's usage fragments into one [`TokenUsage`].
//!
//! Vendors report running totals, not increments, so fields are merged
//! last-write-wins and never summed. Fields no frame reported resolve to
//! zero. One accumulator belongs to one stream; it is not shared.

use tokenspy_core::{TokenUsage, UsageFragment};
use tracing::trace;

use crate::provider::Provider;
use crate::sse::{SseFrame, parse_event_kind};

/// Per-stream usage state.
#[derive(Clone, Debug, Default)]
pub struct StreamUsageAccumulator {
    current_event: Option<String>,
    usage: UsageFragment,
    fragments: usize,
}

impl StreamUsageAccumulator {
    /// Fresh accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one fragment.
    pub fn feed(&mut self, fragment: UsageFragment) {
        self.fragments += 1;
        self.usage.merge(fragment);
    }

    /// Process one raw stream line.
    ///
    /// `event:` lines set the event context for the lines that follow; a
    /// blank line ends the event block. Other lines are handed to
    /// `provider` together with the current event name.
    pub fn feed_line(&mut self, provider: &dyn Provider, line: &str) {
        if line.trim().is_empty() {
            self.current_event = None;
            return;
        }
        if let Some(kind) = parse_event_kind(line) {
            self.current_event = Some(kind.to_string());
            return;
        }
        if let Some(fragment) =
            provider.extract_usage_from_stream(line, self.current_event.as_deref())
        {
            trace!(provider = provider.name(), ?fragment, "stream usage");
            self.feed(fragment);
        }
    }

    /// Process a frame produced by [`parse_sse_frames`](crate::sse::parse_sse_frames).
    pub fn feed_frame(&mut self, provider: &dyn Provider, frame: &SseFrame) {
        self.current_event.clone_from(&frame.event);
        if let Some(fragment) =
            provider.extract_usage_from_stream(&frame.line, frame.event.as_deref())
        {
            self.feed(fragment);
        }
    }

    /// Event name currently in effect.
    pub fn current_event(&self) -> Option<&str> {
        self.current_event.as_deref()
    }

    /// Fragments merged so far.
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Merged (unresolved) usage so far.
    pub fn partial(&self) -> &UsageFragment {
        &self.usage
    }

    /// Resolve the accumulated usage, defaulting unreported fields to zero.
    pub fn finish(&self) -> TokenUsage {
        self.usage.resolve()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
