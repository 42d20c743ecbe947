//! delete_path: records a pending deletion. The user confirms it separately.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::dispatch::{ToolError, ToolHandler};
use crate::sandbox::Operation;

use super::ToolContext;

#[derive(Debug, Deserialize)]
pub struct DeletePathInput {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
    pub reason: String,
}

pub struct DeletePath;

#[async_trait]
impl ToolHandler for DeletePath {
    type Input = DeletePathInput;

    fn validate(&self, input: &DeletePathInput) -> Result<(), ToolError> {
        if input.path.trim().is_empty() {
            return Err(ToolError::InvalidInput("path must not be empty".to_string()));
        }
        if input.reason.trim().is_empty() {
            return Err(ToolError::InvalidInput("reason must not be empty".to_string()));
        }
        Ok(())
    }

    async fn run(&self, input: DeletePathInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = ctx.authorize(&input.path, Operation::Delete)?;
        if input.recursive {
            // Everything the recursive removal would reach must pass the gate too
            let gate = ctx.gate.clone();
            let session_id = ctx.session_id.clone();
            let root = path.clone();
            let restricted = tokio::task::spawn_blocking(move || {
                gate.first_restricted(&session_id, &root, Operation::Delete)
            })
            .await
            .map_err(|e| ToolError::Failed(format!("directory walk failed: {}", e)))?;
            if let Some((child, _)) = restricted {
                ctx.authorize(&child.to_string_lossy(), Operation::Delete)?;
            }
        }
        let pending = ctx
            .deletions
            .request(&ctx.session_id, &path, input.recursive, &input.reason)
            .await?;

        Ok(json!({
            "status": "pending_confirmation",
            "deletion_id": pending.id,
            "path": pending.path.to_string_lossy(),
            "is_directory": pending.is_directory,
            "file_count": pending.file_count,
            "size": pending.size,
            "message": format!(
                "Nothing has been deleted yet. Ask the user to confirm deletion {} of {}.",
                pending.id,
                pending.path.display()
            ),
        }))
    }
}
