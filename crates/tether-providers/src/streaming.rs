//! Shared utilities for streaming SSE response parsing.
//!
//! Bytes arrive in arbitrary chunks; these helpers reassemble UTF-8 and
//! complete lines, and turn `data:` payloads into [`StreamEvent`]s. A single
//! corrupt line is logged and skipped so it cannot abort an otherwise valid
//! stream.

use tracing::{debug, warn};

use crate::StreamEvent;

// ─────────────────────────────────────────────────────────────────────────────
// UTF-8 Streaming
// ─────────────────────────────────────────────────────────────────────────────

/// Decode as much of `byte_buffer` as possible. Invalid sequences are
/// dropped; an incomplete sequence at the end stays in the buffer for the
/// next chunk.
pub fn decode_utf8_streaming(byte_buffer: &mut Vec<u8>) -> Option<String> {
    let mut decoded = String::new();
    loop {
        match std::str::from_utf8(byte_buffer) {
            Ok(s) => {
                decoded.push_str(s);
                byte_buffer.clear();
                break;
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                decoded.push_str(&String::from_utf8_lossy(&byte_buffer[..valid_up_to]));
                match e.error_len() {
                    Some(skip) => {
                        warn!("Dropping {} invalid UTF-8 byte(s) from stream", skip);
                        byte_buffer.drain(..valid_up_to + skip);
                    }
                    None => {
                        byte_buffer.drain(..valid_up_to);
                        break;
                    }
                }
            }
        }
    }
    (!decoded.is_empty()).then_some(decoded)
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE line reassembly
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates raw bytes and yields the payloads of complete `data:` lines.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    byte_buffer: Vec<u8>,
    line_buffer: String,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every complete `data:` payload it closes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.byte_buffer.extend_from_slice(bytes);
        if let Some(text) = decode_utf8_streaming(&mut self.byte_buffer) {
            self.line_buffer.push_str(&text);
        }

        let mut payloads = Vec::new();
        while let Some(line_end) = self.line_buffer.find('\n') {
            let line = self.line_buffer[..line_end].trim().to_string();
            self.line_buffer.drain(..line_end + 1);
            if let Some(data) = Self::data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if !self.byte_buffer.is_empty() {
            warn!(
                "Stream ended inside a UTF-8 sequence; replacing {} byte(s)",
                self.byte_buffer.len()
            );
            let rest = std::mem::take(&mut self.byte_buffer);
            self.line_buffer.push_str(&String::from_utf8_lossy(&rest));
        }
        let line = std::mem::take(&mut self.line_buffer);
        Self::data_payload(line.trim())
    }

    fn data_payload(line: &str) -> Option<String> {
        if line.is_empty() {
            return None;
        }
        match line.strip_prefix("data:") {
            Some(data) => Some(data.trim_start().to_string()),
            None => {
                if line.starts_with("event:") || line.starts_with("id:") || line.starts_with(':') {
                    debug!("SSE control line: {}", line);
                }
                None
            }
        }
    }
}

/// Parse one SSE `data:` payload into an event.
/// Returns `None` for the `[DONE]` marker and for payloads that do not parse.
pub fn parse_sse_data(data: &str) -> Option<StreamEvent> {
    if data == "[DONE]" {
        debug!("Received stream completion marker");
        return None;
    }
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Skipping malformed stream event ({}): {}", e, truncate(data, 200));
            None
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
