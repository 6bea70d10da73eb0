//! # SSE Parser
//!
//! Server-Sent Events helpers shared by the stream extractors.
//!
//! Usage extraction works line by line, so the parser hands back each
//! `data:` line together with the most recent `event:` name seen in the
//! same event block. It handles:
//! - Line buffering from chunked bodies (lines may span chunks)
//! - `\r\n` line endings
//! - Event-name tracking, reset at blank lines
//! - A trailing line with no final newline

use std::fmt::Display;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

/// One `data:` line with its event context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseFrame {
    /// Most recent `event:` name in the current block, if any.
    pub event: Option<String>,
    /// The raw `data:` line, newline stripped.
    pub line: String,
}

/// Parse SSE frames from a byte stream.
///
/// Yields every line that carries a non-empty `data:` payload other than
/// `[DONE]`. Stops at the first read error.
pub fn parse_sse_frames<S, E>(byte_stream: S) -> impl Stream<Item = SseFrame> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Display + Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), None::<String>, false),
        |(mut stream, mut buffer, mut event, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        continue;
                    };

                    if line.trim().is_empty() {
                        event = None;
                        continue;
                    }
                    if let Some(kind) = parse_event_kind(line) {
                        event = Some(kind.to_string());
                        continue;
                    }
                    if extract_sse_data(line).is_some() {
                        let frame = SseFrame {
                            event: event.clone(),
                            line: line.to_string(),
                        };
                        return Some((frame, (stream, buffer, event, false)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        warn!("SSE stream read error: {e}");
                        return None;
                    }
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let Ok(line) = std::str::from_utf8(&buffer) else {
                            return None;
                        };
                        let line = line.trim_end_matches('\r');
                        if extract_sse_data(line).is_some() {
                            let frame = SseFrame {
                                event: event.clone(),
                                line: line.to_string(),
                            };
                            buffer.clear();
                            return Some((frame, (stream, buffer, event, true)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Event name from an `event:` line, trimmed.
pub fn parse_event_kind(line: &str) -> Option<&str> {
    let name = line.trim().strip_prefix("event:")?.trim();
    (!name.is_empty()).then_some(name)
}

/// Extract the data payload from an SSE line.
///
/// Returns `Some(data)` for data lines, `None` for other fields, comments,
/// empty payloads, and the `[DONE]` marker.
pub fn extract_sse_data(line: &str) -> Option<&str> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data)
}

/// Parse a data payload as JSON.
///
/// Returns `None` on parse failure. Streams routinely carry non-JSON
/// keep-alives, so failures log at debug.
pub fn parse_sse_data<T: serde::de::DeserializeOwned>(data: &str, provider: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(
                provider,
                error = %e,
                data_preview = tokenspy_core::text::truncate_str(data, 100),
                "skipping unparsable SSE data"
            );
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
