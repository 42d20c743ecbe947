//! Shared state handed to every tool handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tether_bridge::BrowserCommands;
use tether_config::ToolsConfig;
use tether_execution::ShellExecutor;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::DirEntry;

use crate::dispatch::ToolError;
use crate::sandbox::deletion::DeletionManager;
use crate::sandbox::{Access, CapabilityGate, Classification, Operation};

const MAX_WITHHELD: usize = 50;

#[derive(Clone)]
pub struct ToolContext {
    pub session_id: String,
    pub working_dir: PathBuf,
    pub gate: Arc<CapabilityGate>,
    pub deletions: Arc<DeletionManager>,
    pub shell: ShellExecutor,
    pub http: reqwest::Client,
    pub browser: Option<Arc<dyn BrowserCommands>>,
    pub limits: ToolsConfig,
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Expand `~` and resolve relative paths against the session working dir.
    pub fn resolve_path(&self, raw: &str) -> PathBuf {
        let expanded = shellexpand::tilde(raw.trim());
        let path = Path::new(expanded.as_ref());
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    /// Resolve `raw` and ask the gate about it. The filesystem is not touched
    /// unless the answer is allowed.
    pub fn authorize(&self, raw: &str, operation: Operation) -> Result<PathBuf, ToolError> {
        let path = self.resolve_path(raw);
        let display = path.to_string_lossy().into_owned();
        match self.gate.classify(&self.session_id, &display, operation) {
            Classification::Allowed => Ok(path),
            Classification::Denied { reason } => Err(ToolError::Denied {
                path: display,
                reason,
            }),
            Classification::RequiresApproval { pending_id } => {
                let reason = self
                    .gate
                    .pending(&pending_id)
                    .map(|p| p.reason)
                    .unwrap_or_default();
                Err(ToolError::NeedsApproval {
                    pending_id,
                    path: display,
                    operation,
                    reason,
                })
            }
        }
    }

    /// Gate for the entries of a walk below `root`, which must already be authorized.
    pub fn walk_gate(&self, root: &Path, operation: Operation) -> WalkGate {
        WalkGate::new(self.gate.clone(), &self.session_id, operation, root)
    }

    pub fn browser(&self) -> Result<&Arc<dyn BrowserCommands>, ToolError> {
        self.browser
            .as_ref()
            .ok_or(ToolError::Bridge(tether_bridge::BridgeError::NotConnected))
    }

    /// Cut `text` to the configured output limit on a char boundary.
    pub fn truncate(&self, text: &str) -> (String, bool) {
        truncate_to(text, self.limits.max_output_bytes)
    }
}

/// Checks every entry of a directory walk. An entry that is not allowed is
/// skipped along with its subtree and reported as withheld. No pending
/// request is recorded; the model has to ask for that path directly.
pub struct WalkGate {
    gate: Arc<CapabilityGate>,
    session_id: String,
    operation: Operation,
    root: PathBuf,
    withheld: Vec<Value>,
}

impl WalkGate {
    pub fn new(gate: Arc<CapabilityGate>, session_id: &str, operation: Operation, root: &Path) -> Self {
        Self {
            gate,
            session_id: session_id.to_string(),
            operation,
            root: root.to_path_buf(),
            withheld: Vec::new(),
        }
    }

    /// Predicate for `WalkDir::filter_entry`.
    pub fn admit(&mut self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        let (status, reason) =
            match self
                .gate
                .check(&self.session_id, &entry.path().to_string_lossy(), self.operation)
            {
                Access::Allowed => return true,
                Access::Denied { reason } => ("denied", reason),
                Access::NeedsApproval { reason } => ("needs_approval", reason),
            };

        debug!("Withholding {} from {} walk: {}", entry.path().display(), self.operation, reason);
        if self.withheld.len() < MAX_WITHHELD {
            let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
            self.withheld.push(json!({
                "path": relative.to_string_lossy(),
                "status": status,
                "reason": reason,
            }));
        }
        false
    }

    pub fn withheld(&self) -> &[Value] {
        &self.withheld
    }

    pub fn into_withheld(self) -> Vec<Value> {
        self.withheld
    }
}

pub fn truncate_to(text: &str, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text.to_string(), false);
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (text[..end].to_string(), true)
}
