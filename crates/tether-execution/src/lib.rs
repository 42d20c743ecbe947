//! Subprocess execution for the `run_shell` tool.
//!
//! Commands run under `bash -c` with stdout and stderr streamed line by line
//! to an [`OutputReceiver`]. Every call is bounded by a timeout and can be
//! cancelled; in both cases the child is killed.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("working directory does not exist: {0}")]
    MissingWorkingDir(String),
    #[error("failed to spawn command: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("command timed out after {0:?}")]
    Timeout(Duration),
    #[error("command cancelled")]
    Cancelled,
}

/// Trait for receiving streaming output from command execution
pub trait OutputReceiver: Send + Sync {
    /// Called when a new line of output is available
    fn on_output_line(&self, line: &str);
}

/// Receiver that discards output.
pub struct NullReceiver;

impl OutputReceiver for NullReceiver {
    fn on_output_line(&self, _line: &str) {}
}

#[derive(Debug, Clone)]
pub struct ShellExecutor {
    default_timeout: Duration,
}

impl ShellExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Run `command` and stream its output, killing it on timeout or cancel.
    pub async fn execute_streaming<R: OutputReceiver>(
        &self,
        command: &str,
        receiver: &R,
        working_dir: Option<&Path>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        debug!("Executing shell command (timeout {:?}): {}", timeout, command);

        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = working_dir {
            let expanded = shellexpand::tilde(&dir.to_string_lossy()).to_string();
            if !Path::new(&expanded).is_dir() {
                return Err(ExecutionError::MissingWorkingDir(expanded));
            }
            cmd.current_dir(expanded);
        }

        let mut child = cmd.spawn()?;
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ExecutionError::Spawn(std::io::Error::other(
                "child process has no output pipes",
            )));
        };

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stdout_output = Vec::new();
        let mut stderr_output = Vec::new();
        let mut stdout_open = true;
        let mut stderr_open = true;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while stdout_open || stderr_open {
            tokio::select! {
                line = stdout_lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        receiver.on_output_line(&line);
                        stdout_output.push(line);
                    }
                    Ok(None) => stdout_open = false,
                    Err(e) => {
                        error!("Error reading stdout: {}", e);
                        stdout_open = false;
                    }
                },
                line = stderr_lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        receiver.on_output_line(&line);
                        stderr_output.push(line);
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        error!("Error reading stderr: {}", e);
                        stderr_open = false;
                    }
                },
                _ = &mut deadline => {
                    warn!("Shell command timed out after {:?}: {}", timeout, command);
                    let _ = child.kill().await;
                    return Err(ExecutionError::Timeout(timeout));
                }
                _ = cancel.cancelled() => {
                    debug!("Shell command cancelled: {}", command);
                    let _ = child.kill().await;
                    return Err(ExecutionError::Cancelled);
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status?,
            _ = &mut deadline => {
                let _ = child.kill().await;
                return Err(ExecutionError::Timeout(timeout));
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(ExecutionError::Cancelled);
            }
        };

        let result = ExecutionResult {
            stdout: stdout_output.join("\n"),
            stderr: stderr_output.join("\n"),
            exit_code: status.code().unwrap_or(-1),
            success: status.success(),
        };
        debug!(
            "Shell command finished: exit={} stdout={}B stderr={}B",
            result.exit_code,
            result.stdout.len(),
            result.stderr.len()
        );
        Ok(result)
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}
