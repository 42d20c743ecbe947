//! Shell command execution tool.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tether_execution::{ExecutionError, OutputReceiver};
use tracing::{debug, trace};

use crate::dispatch::{ToolError, ToolHandler};
use crate::sandbox::Operation;

use super::ToolContext;

#[derive(Debug, Deserialize)]
pub struct RunShellInput {
    pub command: String,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

pub struct RunShell;

struct TraceReceiver;

impl OutputReceiver for TraceReceiver {
    fn on_output_line(&self, line: &str) {
        trace!("shell: {}", line);
    }
}

#[async_trait]
impl ToolHandler for RunShell {
    type Input = RunShellInput;

    fn validate(&self, input: &RunShellInput) -> Result<(), ToolError> {
        if input.command.trim().is_empty() {
            return Err(ToolError::InvalidInput("command must not be empty".to_string()));
        }
        if input.timeout_secs == Some(0) {
            return Err(ToolError::InvalidInput("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }

    async fn run(&self, input: RunShellInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let dir_arg = input
            .working_dir
            .clone()
            .unwrap_or_else(|| ctx.working_dir.to_string_lossy().into_owned());
        let working_dir = ctx.authorize(&dir_arg, Operation::Execute)?;
        let timeout = input.timeout_secs.map(Duration::from_secs);

        debug!("run_shell in {}: {}", working_dir.display(), input.command);
        let result = ctx
            .shell
            .execute_streaming(
                &input.command,
                &TraceReceiver,
                Some(&working_dir),
                timeout,
                &ctx.cancel,
            )
            .await
            .map_err(|e| match e {
                ExecutionError::Cancelled => ToolError::Cancelled,
                other => ToolError::Failed(other.to_string()),
            })?;

        let (stdout, stdout_truncated) = ctx.truncate(&result.stdout);
        let (stderr, stderr_truncated) = ctx.truncate(&result.stderr);
        let value = json!({
            "exit_code": result.exit_code,
            "stdout": stdout,
            "stderr": stderr,
            "truncated": stdout_truncated || stderr_truncated,
        });

        if result.success {
            Ok(value)
        } else {
            // Failing commands are reported as tool errors with their output attached
            Err(ToolError::Failed(format!(
                "command exited with code {}: {}",
                result.exit_code, value
            )))
        }
    }
}
