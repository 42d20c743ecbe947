//! Tool dispatch: routes a tool call to its handler and normalizes the result.
//!
//! Tools form a closed set ([`ToolKind`]); each has a typed input that is
//! deserialized and validated before its handler runs. Whatever happens inside
//! a handler, including a panic, the caller gets back a [`ToolOutcome`] value.
//! Sandbox refusals come back as structured, non-error results so the model
//! can relay them.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tether_bridge::BridgeError;
use tether_providers::{ContentBlock, ToolCall};
use tracing::{debug, error, warn};

use crate::sandbox::deletion::DeletionError;
use crate::sandbox::Operation;
use crate::tools::{browser, delete, file_ops, search, shell, web, ToolContext};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{operation} access to {path} requires approval ({pending_id})")]
    NeedsApproval {
        pending_id: String,
        path: String,
        operation: Operation,
        reason: String,
    },
    #[error("access to {path} denied: {reason}")]
    Denied { path: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Deletion(#[from] DeletionError),
    #[error("cancelled")]
    Cancelled,
    #[error("{0}")]
    Failed(String),
}

/// Every tool the model can call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ReadFile,
    WriteFile,
    EditFile,
    ListDirectory,
    SearchFiles,
    RunShell,
    WebFetch,
    BrowserNavigate,
    BrowserClick,
    BrowserType,
    BrowserReadPage,
    BrowserScreenshot,
    BrowserEvaluate,
    DeletePath,
}

impl ToolKind {
    pub const ALL: [ToolKind; 14] = [
        Self::ReadFile,
        Self::WriteFile,
        Self::EditFile,
        Self::ListDirectory,
        Self::SearchFiles,
        Self::RunShell,
        Self::WebFetch,
        Self::BrowserNavigate,
        Self::BrowserClick,
        Self::BrowserType,
        Self::BrowserReadPage,
        Self::BrowserScreenshot,
        Self::BrowserEvaluate,
        Self::DeletePath,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::EditFile => "edit_file",
            Self::ListDirectory => "list_directory",
            Self::SearchFiles => "search_files",
            Self::RunShell => "run_shell",
            Self::WebFetch => "web_fetch",
            Self::BrowserNavigate => "browser_navigate",
            Self::BrowserClick => "browser_click",
            Self::BrowserType => "browser_type",
            Self::BrowserReadPage => "browser_read_page",
            Self::BrowserScreenshot => "browser_screenshot",
            Self::BrowserEvaluate => "browser_evaluate",
            Self::DeletePath => "delete_path",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn is_browser(&self) -> bool {
        matches!(
            self,
            Self::BrowserNavigate
                | Self::BrowserClick
                | Self::BrowserType
                | Self::BrowserReadPage
                | Self::BrowserScreenshot
                | Self::BrowserEvaluate
        )
    }
}

/// A tool implementation with a typed input.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    type Input: DeserializeOwned + Send;

    /// Checks that need no I/O. Runs before [`run`](Self::run).
    fn validate(&self, _input: &Self::Input) -> Result<(), ToolError> {
        Ok(())
    }

    async fn run(&self, input: Self::Input, ctx: &ToolContext) -> Result<Value, ToolError>;
}

async fn invoke<H: ToolHandler>(
    handler: &H,
    input: &Value,
    ctx: &ToolContext,
) -> Result<Value, ToolError> {
    let input: H::Input = serde_json::from_value(input.clone())
        .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
    handler.validate(&input)?;
    handler.run(input, ctx).await
}

/// Normalized result of one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub tool_use_id: String,
    pub name: String,
    pub is_error: bool,
    pub content: Value,
}

impl ToolOutcome {
    fn from_result(call: &ToolCall, result: Result<Value, ToolError>) -> Self {
        let (is_error, content) = match result {
            Ok(value) => (false, value),
            Err(ToolError::NeedsApproval {
                pending_id,
                path,
                operation,
                reason,
            }) => (
                false,
                json!({
                    "status": "needs_approval",
                    "permission_id": pending_id,
                    "path": path,
                    "operation": operation,
                    "reason": reason,
                    "message": format!(
                        "{} access to {} needs the user's approval. Ask them to approve {} and then retry the same call.",
                        operation, path, pending_id
                    ),
                }),
            ),
            Err(ToolError::Denied { path, reason }) => (
                false,
                json!({
                    "status": "denied",
                    "path": path,
                    "reason": reason,
                    "message": format!("Access to {} is not allowed: {}", path, reason),
                }),
            ),
            Err(e) => (true, json!({ "error": e.to_string() })),
        };
        Self {
            tool_use_id: call.id.clone(),
            name: call.name.clone(),
            is_error,
            content,
        }
    }

    /// Text sent back to the provider: strings as-is, anything else as JSON.
    pub fn content_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_content_block(&self) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: self.tool_use_id.clone(),
            content: self.content_text(),
            is_error: self.is_error,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ToolDispatcher;

impl ToolDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Run one tool call. Never fails: errors, panics and cancellation are
    /// all folded into the outcome.
    pub async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> ToolOutcome {
        debug!("Dispatching tool: {} ({})", call.name, call.id);

        let Some(kind) = ToolKind::from_name(&call.name) else {
            warn!("Unknown tool: {}", call.name);
            return ToolOutcome::from_result(
                call,
                Err(ToolError::InvalidInput(format!("unknown tool '{}'", call.name))),
            );
        };

        let guarded = AssertUnwindSafe(Self::route(kind, &call.input, ctx)).catch_unwind();
        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled),
            result = guarded => match result {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!("Tool {} panicked: {}", call.name, message);
                    Err(ToolError::Failed(format!("tool panicked: {}", message)))
                }
            },
        };

        if let Err(e) = &result {
            debug!("Tool {} returned error: {}", call.name, e);
        }
        ToolOutcome::from_result(call, result)
    }

    async fn route(kind: ToolKind, input: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        match kind {
            ToolKind::ReadFile => invoke(&file_ops::ReadFile, input, ctx).await,
            ToolKind::WriteFile => invoke(&file_ops::WriteFile, input, ctx).await,
            ToolKind::EditFile => invoke(&file_ops::EditFile, input, ctx).await,
            ToolKind::ListDirectory => invoke(&file_ops::ListDirectory, input, ctx).await,
            ToolKind::SearchFiles => invoke(&search::SearchFiles, input, ctx).await,
            ToolKind::RunShell => invoke(&shell::RunShell, input, ctx).await,
            ToolKind::WebFetch => invoke(&web::WebFetch, input, ctx).await,
            ToolKind::BrowserNavigate => invoke(&browser::Navigate, input, ctx).await,
            ToolKind::BrowserClick => invoke(&browser::Click, input, ctx).await,
            ToolKind::BrowserType => invoke(&browser::TypeText, input, ctx).await,
            ToolKind::BrowserReadPage => invoke(&browser::ReadPage, input, ctx).await,
            ToolKind::BrowserScreenshot => invoke(&browser::Screenshot, input, ctx).await,
            ToolKind::BrowserEvaluate => invoke(&browser::Evaluate, input, ctx).await,
            ToolKind::DeletePath => invoke(&delete::DeletePath, input, ctx).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_names_round_trip() {
        for kind in ToolKind::ALL {
            assert_eq!(ToolKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ToolKind::from_name("rm_rf"), None);
    }

    #[test]
    fn test_needs_approval_is_not_an_error() {
        let call = ToolCall {
            id: "t1".into(),
            name: "read_file".into(),
            input: json!({}),
        };
        let outcome = ToolOutcome::from_result(
            &call,
            Err(ToolError::NeedsApproval {
                pending_id: "perm-1".into(),
                path: "/etc/hosts".into(),
                operation: Operation::Read,
                reason: "read access to a system directory".into(),
            }),
        );
        assert!(!outcome.is_error);
        assert_eq!(outcome.content["status"], "needs_approval");
        assert_eq!(outcome.content["permission_id"], "perm-1");
        assert_eq!(outcome.content["operation"], "read");
    }

    #[test]
    fn test_failures_become_error_objects() {
        let call = ToolCall {
            id: "t2".into(),
            name: "run_shell".into(),
            input: json!({}),
        };
        let outcome = ToolOutcome::from_result(&call, Err(ToolError::Failed("boom".into())));
        assert!(outcome.is_error);
        assert_eq!(outcome.content, json!({"error": "boom"}));
        match outcome.to_content_block() {
            ContentBlock::ToolResult {
                tool_use_id,
                is_error,
                content,
            } => {
                assert_eq!(tool_use_id, "t2");
                assert!(is_error);
                assert_eq!(content, r#"{"error":"boom"}"#);
            }
            other => panic!("unexpected block {:?}", other),
        }
    }
}
