//! Provider stream events.
//!
//! These mirror the Anthropic Messages streaming shape: a message is a series
//! of indexed content blocks, each opened, extended with deltas and closed,
//! followed by a message-level delta carrying the stop reason.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Usage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        #[serde(default)]
        message: Value,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlockStart,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: String,
    },
    RedactedThinking {
        #[serde(default)]
        data: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

// Shorthand constructors, used by the mock provider and by tests.
impl StreamEvent {
    pub fn text_start(index: usize) -> Self {
        Self::ContentBlockStart {
            index,
            content_block: ContentBlockStart::Text {
                text: String::new(),
            },
        }
    }

    pub fn thinking_start(index: usize) -> Self {
        Self::ContentBlockStart {
            index,
            content_block: ContentBlockStart::Thinking {
                thinking: String::new(),
                signature: String::new(),
            },
        }
    }

    pub fn tool_use_start(index: usize, id: &str, name: &str) -> Self {
        Self::ContentBlockStart {
            index,
            content_block: ContentBlockStart::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: Value::Object(Default::default()),
            },
        }
    }

    pub fn text_delta(index: usize, text: &str) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: BlockDelta::TextDelta {
                text: text.to_string(),
            },
        }
    }

    pub fn thinking_delta(index: usize, thinking: &str) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: BlockDelta::ThinkingDelta {
                thinking: thinking.to_string(),
            },
        }
    }

    pub fn signature_delta(index: usize, signature: &str) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: BlockDelta::SignatureDelta {
                signature: signature.to_string(),
            },
        }
    }

    pub fn input_json_delta(index: usize, partial_json: &str) -> Self {
        Self::ContentBlockDelta {
            index,
            delta: BlockDelta::InputJsonDelta {
                partial_json: partial_json.to_string(),
            },
        }
    }

    pub fn block_stop(index: usize) -> Self {
        Self::ContentBlockStop { index }
    }

    pub fn stop(reason: &str) -> Self {
        Self::MessageDelta {
            delta: MessageDeltaBody {
                stop_reason: Some(reason.to_string()),
            },
            usage: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_tool_use_block_start() {
        let json = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_01","name":"read_file","input":{}}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, StreamEvent::tool_use_start(1, "toolu_01", "read_file"));
    }

    #[test]
    fn test_parses_input_json_delta() {
        let json = r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"pa"}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, StreamEvent::input_json_delta(1, "{\"pa"));
    }

    #[test]
    fn test_parses_message_delta_with_usage() {
        let json = r#"{"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":42}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        match event {
            StreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.stop_reason.as_deref(), Some("tool_use"));
                assert_eq!(usage.unwrap().output_tokens, 42);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_and_delta_types_are_tolerated() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"brand_new_event","foo":1}"#).unwrap();
        assert_eq!(event, StreamEvent::Unknown);

        let json = r#"{"type":"content_block_delta","index":0,"delta":{"type":"citations_delta","citation":{}}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            StreamEvent::ContentBlockDelta {
                index: 0,
                delta: BlockDelta::Other
            }
        );
    }

    #[test]
    fn test_parses_thinking_signature() {
        let json = r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"EqQBCgIYAhIM"}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, StreamEvent::signature_delta(0, "EqQBCgIYAhIM"));

        let json = r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#;
        let event: StreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, StreamEvent::thinking_start(0));
    }
}
