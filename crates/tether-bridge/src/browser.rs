use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{BridgeError, RemoteCommandBridge};

/// Actions understood by the automation client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    Navigate,
    Click,
    Type,
    ReadPage,
    Screenshot,
    Evaluate,
}

impl BrowserAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::ReadPage => "read_page",
            Self::Screenshot => "screenshot",
            Self::Evaluate => "evaluate",
        }
    }
}

/// Browser control over the bridge.
#[async_trait]
pub trait BrowserCommands: Send + Sync {
    async fn execute(&self, action: BrowserAction, params: Value) -> Result<Value, BridgeError>;

    fn is_connected(&self) -> bool;

    /// Navigate the active tab to a URL
    async fn navigate(&self, url: &str) -> Result<Value, BridgeError> {
        self.execute(BrowserAction::Navigate, json!({ "url": url }))
            .await
    }

    /// Click the first element matching a CSS selector
    async fn click(&self, selector: &str) -> Result<Value, BridgeError> {
        self.execute(BrowserAction::Click, json!({ "selector": selector }))
            .await
    }

    async fn type_text(
        &self,
        selector: &str,
        text: &str,
        submit: bool,
    ) -> Result<Value, BridgeError> {
        self.execute(
            BrowserAction::Type,
            json!({ "selector": selector, "text": text, "submit": submit }),
        )
        .await
    }

    /// Text content of the page (or of one element)
    async fn read_page(&self, selector: Option<&str>) -> Result<Value, BridgeError> {
        let params = match selector {
            Some(selector) => json!({ "selector": selector }),
            None => json!({}),
        };
        self.execute(BrowserAction::ReadPage, params).await
    }

    async fn screenshot(&self) -> Result<Value, BridgeError> {
        self.execute(BrowserAction::Screenshot, json!({})).await
    }

    /// Run JavaScript in the page and return its result
    async fn evaluate(&self, script: &str) -> Result<Value, BridgeError> {
        self.execute(BrowserAction::Evaluate, json!({ "script": script }))
            .await
    }
}

#[async_trait]
impl BrowserCommands for RemoteCommandBridge {
    async fn execute(&self, action: BrowserAction, params: Value) -> Result<Value, BridgeError> {
        self.send(action.as_str(), params).await
    }

    fn is_connected(&self) -> bool {
        RemoteCommandBridge::is_connected(self)
    }
}
