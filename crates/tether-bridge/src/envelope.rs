//! Wire format between the bridge and the automation client.
//!
//! Outbound: `{"id": 7, "action": "navigate", "params": {...}}`.
//! Inbound: `{"id": 7, "result": ...}` or `{"id": 7, "error": ...}`, plus a
//! `{"type": "register", ...}` handshake acknowledged with
//! `{"type": "registered"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: u64,
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Client handshake; `client` is whatever name it announced.
    Register { client: Option<String> },
    Response {
        id: u64,
        outcome: Result<Value, String>,
    },
    /// Typed message the bridge does not act on.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct RawInbound {
    #[serde(rename = "type")]
    kind: Option<String>,
    id: Option<u64>,
    result: Option<Value>,
    error: Option<Value>,
    client: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has neither an id nor a type")]
    Untyped,
}

pub fn parse_inbound(text: &str) -> Result<Inbound, EnvelopeError> {
    let raw: RawInbound = serde_json::from_str(text)?;

    if let Some(id) = raw.id {
        let outcome = match raw.error {
            Some(error) if !error.is_null() => Err(error_message(&error)),
            _ => Ok(raw.result.unwrap_or(Value::Null)),
        };
        return Ok(Inbound::Response { id, outcome });
    }

    match raw.kind.as_deref() {
        Some("register") => Ok(Inbound::Register { client: raw.client }),
        Some(other) => Ok(Inbound::Other(other.to_string())),
        None => Err(EnvelopeError::Untyped),
    }
}

/// Error payloads arrive as a bare string or as `{"message": ...}`.
fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        },
        other => other.to_string(),
    }
}

pub fn registered_ack() -> String {
    serde_json::json!({ "type": "registered" }).to_string()
}
