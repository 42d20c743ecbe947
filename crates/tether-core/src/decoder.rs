//! Reduces a provider event stream into one decoded turn.
//!
//! The decoder is fed events in order with [`EventStreamDecoder::apply`],
//! which hands back fragments worth showing immediately (text, reasoning,
//! completed tool calls). [`EventStreamDecoder::finish`] closes anything
//! still open and returns the whole turn. Events that do not fit the current
//! block state are logged and skipped.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tether_providers::{BlockDelta, ContentBlock, ContentBlockStart, StreamEvent, ToolCall, Usage};
use tracing::{debug, warn};

/// Something the caller can surface before the turn ends.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFragment {
    Text(String),
    Thinking(String),
    ToolCall(ToolCall),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedTurn {
    /// Text of each text block, in the order the blocks closed.
    pub text_chunks: Vec<String>,
    pub reasoning: String,
    pub tool_calls: Vec<ToolCall>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
    /// Thinking, text and tool_use blocks as they should be recorded in history.
    pub content: Vec<ContentBlock>,
    /// `message_stop` was seen. A stream that ends without it was cut off.
    pub complete: bool,
}

impl DecodedTurn {
    pub fn text(&self) -> String {
        self.text_chunks.concat()
    }
}

#[derive(Debug)]
enum OpenBlock {
    Text(String),
    Thinking {
        thinking: String,
        signature: String,
    },
    RedactedThinking(String),
    ToolUse {
        id: String,
        name: String,
        initial: Value,
        arguments: String,
    },
    Ignored,
}

#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    open: BTreeMap<usize, OpenBlock>,
    turn: DecodedTurn,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &StreamEvent) -> Option<DecodedFragment> {
        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let block = match content_block {
                    ContentBlockStart::Text { text } => OpenBlock::Text(text.clone()),
                    ContentBlockStart::Thinking { thinking, signature } => OpenBlock::Thinking {
                        thinking: thinking.clone(),
                        signature: signature.clone(),
                    },
                    ContentBlockStart::RedactedThinking { data } => {
                        OpenBlock::RedactedThinking(data.clone())
                    }
                    ContentBlockStart::ToolUse { id, name, input } => {
                        debug!("Tool use block {} opened: {} ({})", index, name, id);
                        OpenBlock::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            initial: input.clone(),
                            arguments: String::new(),
                        }
                    }
                    ContentBlockStart::Other => OpenBlock::Ignored,
                };
                if self.open.insert(*index, block).is_some() {
                    warn!("Content block {} reopened before it was closed", index);
                }
                None
            }
            StreamEvent::ContentBlockDelta { index, delta } => self.apply_delta(*index, delta),
            StreamEvent::ContentBlockStop { index } => match self.open.remove(index) {
                Some(block) => self.close(block),
                None => {
                    warn!("Stop for unknown content block {}", index);
                    None
                }
            },
            StreamEvent::MessageDelta { delta, usage } => {
                if delta.stop_reason.is_some() {
                    self.turn.stop_reason = delta.stop_reason.clone();
                }
                if usage.is_some() {
                    self.turn.usage = usage.clone();
                }
                None
            }
            StreamEvent::MessageStop => {
                self.turn.complete = true;
                None
            }
            StreamEvent::MessageStart { .. }
            | StreamEvent::Ping
            | StreamEvent::Unknown => None,
            StreamEvent::Error { error } => {
                // Providers surface this as a stream error; seen here only in replays
                warn!("Error event in stream: {} {}", error.kind, error.message);
                None
            }
        }
    }

    fn apply_delta(&mut self, index: usize, delta: &BlockDelta) -> Option<DecodedFragment> {
        let Some(block) = self.open.get_mut(&index) else {
            warn!("Delta for unknown content block {}", index);
            return None;
        };
        match (block, delta) {
            (OpenBlock::Text(buffer), BlockDelta::TextDelta { text }) => {
                buffer.push_str(text);
                Some(DecodedFragment::Text(text.clone()))
            }
            (OpenBlock::Thinking { thinking: buffer, .. }, BlockDelta::ThinkingDelta { thinking }) => {
                buffer.push_str(thinking);
                Some(DecodedFragment::Thinking(thinking.clone()))
            }
            (OpenBlock::Thinking { signature: buffer, .. }, BlockDelta::SignatureDelta { signature }) => {
                buffer.push_str(signature);
                None
            }
            (OpenBlock::ToolUse { arguments, .. }, BlockDelta::InputJsonDelta { partial_json }) => {
                arguments.push_str(partial_json);
                None
            }
            (OpenBlock::Ignored, _) | (_, BlockDelta::Other) => None,
            (_, delta) => {
                warn!("Delta {:?} does not match content block {}", delta, index);
                None
            }
        }
    }

    fn close(&mut self, block: OpenBlock) -> Option<DecodedFragment> {
        match block {
            OpenBlock::Text(text) => {
                if !text.is_empty() {
                    self.turn.content.push(ContentBlock::Text { text: text.clone() });
                    self.turn.text_chunks.push(text);
                }
                None
            }
            OpenBlock::Thinking { thinking, signature } => {
                self.turn.reasoning.push_str(&thinking);
                self.turn.content.push(ContentBlock::Thinking { thinking, signature });
                None
            }
            OpenBlock::RedactedThinking(data) => {
                self.turn.content.push(ContentBlock::RedactedThinking { data });
                None
            }
            OpenBlock::ToolUse {
                id,
                name,
                initial,
                arguments,
            } => {
                let input = parse_tool_input(&name, &initial, &arguments);
                let call = ToolCall { id, name, input };
                self.turn.content.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                });
                self.turn.tool_calls.push(call.clone());
                Some(DecodedFragment::ToolCall(call))
            }
            OpenBlock::Ignored => None,
        }
    }

    /// Close any blocks left open and return the turn. Tool calls completed
    /// here were not reported through [`apply`](Self::apply).
    pub fn finish(mut self) -> (DecodedTurn, Vec<ToolCall>) {
        let mut late_calls = Vec::new();
        let open = std::mem::take(&mut self.open);
        for (index, block) in open {
            debug!("Closing content block {} at end of stream", index);
            if let Some(DecodedFragment::ToolCall(call)) = self.close(block) {
                late_calls.push(call);
            }
        }
        (self.turn, late_calls)
    }
}

/// Parse accumulated tool arguments. Anything that is not a JSON object
/// becomes `{}` so one bad call cannot fail the turn.
fn parse_tool_input(name: &str, initial: &Value, arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return match initial {
            Value::Object(map) if !map.is_empty() => initial.clone(),
            _ => Value::Object(Map::new()),
        };
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!("Tool input for {} is not an object ({}), using {{}}", name, other);
            Value::Object(Map::new())
        }
        Err(e) => {
            warn!("Failed to parse tool input for {}: {}", name, e);
            Value::Object(Map::new())
        }
    }
}

/// Decode a complete event sequence in one go.
pub fn decode_events<'a>(events: impl IntoIterator<Item = &'a StreamEvent>) -> DecodedTurn {
    let mut decoder = EventStreamDecoder::new();
    for event in events {
        decoder.apply(event);
    }
    decoder.finish().0
}
