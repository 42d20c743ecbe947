//! Display utilities for tether CLI.
//!
//! Renders the agent event stream either as formatted terminal output or as
//! JSON lines.

use crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};
use serde_json::Value;
use std::path::Path;
use tether_core::AgentEvent;

use crate::simple_output::SimpleOutput;

const MAX_ARG_CHARS: usize = 80;
const MAX_RESULT_CHARS: usize = 160;

/// Format a workspace path for display, replacing home directory with ~.
pub fn format_workspace_path(workspace_path: &Path) -> String {
    let path_str = workspace_path.display().to_string();
    dirs::home_dir()
        .and_then(|home| {
            path_str
                .strip_prefix(&home.display().to_string())
                .map(|s| format!("~{}", s))
        })
        .unwrap_or(path_str)
}

fn clip(text: &str, max_chars: usize) -> String {
    let single_line = text.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let cut: String = single_line.chars().take(max_chars).collect();
    format!("{}…", cut)
}

/// One-line summary of a tool call's arguments.
pub fn summarize_input(input: &Value) -> String {
    let Some(map) = input.as_object() else {
        return clip(&input.to_string(), MAX_ARG_CHARS);
    };
    // The most telling argument first
    for key in ["path", "command", "url", "selector", "pattern", "script"] {
        if let Some(Value::String(s)) = map.get(key) {
            return clip(s, MAX_ARG_CHARS);
        }
    }
    clip(&input.to_string(), MAX_ARG_CHARS)
}

/// One-line summary of a tool result, with the follow-up the user can take.
pub fn summarize_result(is_error: bool, content: &Value) -> (Color, String) {
    match content.get("status").and_then(Value::as_str) {
        Some("needs_approval") => {
            let id = content["permission_id"].as_str().unwrap_or_default();
            let path = content["path"].as_str().unwrap_or_default();
            let operation = content["operation"].as_str().unwrap_or_default();
            (
                Color::Yellow,
                format!("{} {} needs approval: /approve {} or /deny {}", operation, path, id, id),
            )
        }
        Some("denied") => (
            Color::Red,
            format!("denied: {}", content["reason"].as_str().unwrap_or_default()),
        ),
        Some("pending_confirmation") => {
            let id = content["deletion_id"].as_str().unwrap_or_default();
            (
                Color::Yellow,
                format!("deletion pending: /confirm {} or /cancel {}", id, id),
            )
        }
        _ if is_error => {
            let message = match content.get("error").and_then(Value::as_str) {
                Some(message) => message.to_string(),
                None => content.to_string(),
            };
            (Color::Red, clip(&message, MAX_RESULT_CHARS))
        }
        _ => (Color::DarkGrey, "ok".to_string()),
    }
}

/// Prints agent events as they arrive.
pub struct EventRenderer {
    output: SimpleOutput,
    json: bool,
    /// A text or thinking fragment was printed without a trailing newline.
    mid_line: bool,
}

impl EventRenderer {
    pub fn new(json: bool) -> Self {
        Self {
            output: SimpleOutput::new(),
            json,
            mid_line: false,
        }
    }

    fn end_line(&mut self) {
        if self.mid_line {
            self.output.print("");
            self.mid_line = false;
        }
    }

    pub fn render(&mut self, event: &AgentEvent) {
        if self.json {
            match serde_json::to_string(event) {
                Ok(line) => self.output.print(&line),
                Err(e) => tracing::warn!("Failed to encode event: {}", e),
            }
            return;
        }

        match event {
            AgentEvent::SessionInit { provider, model, .. } => {
                tracing::debug!("Run started on {} ({})", provider, model);
            }
            AgentEvent::Text { text } => {
                self.output.print_inline(text);
                self.mid_line = !text.ends_with('\n');
            }
            AgentEvent::Thinking { thinking } => {
                self.output.print_inline(&format!(
                    "{}{}{}",
                    SetForegroundColor(Color::DarkGrey),
                    thinking,
                    ResetColor
                ));
                self.mid_line = !thinking.ends_with('\n');
            }
            AgentEvent::ToolUse { name, input, .. } => {
                self.end_line();
                self.output.print(&format!(
                    "{}● {}{}{} {}",
                    SetForegroundColor(Color::Cyan),
                    SetAttribute(Attribute::Bold),
                    name,
                    SetAttribute(Attribute::Reset),
                    summarize_input(input)
                ));
            }
            AgentEvent::ToolResult {
                is_error, content, ..
            } => {
                let (color, summary) = summarize_result(*is_error, content);
                self.output.print(&format!(
                    "  {}└ {}{}",
                    SetForegroundColor(color),
                    summary,
                    ResetColor
                ));
            }
            AgentEvent::Error { message } => {
                self.end_line();
                self.output.print(&format!(
                    "{}error:{} {}",
                    SetForegroundColor(Color::Red),
                    ResetColor,
                    message
                ));
            }
            AgentEvent::Done { notice, .. } => {
                self.end_line();
                if let Some(notice) = notice {
                    self.output.print(&format!(
                        "{}{}{}",
                        SetForegroundColor(Color::Yellow),
                        notice,
                        ResetColor
                    ));
                }
            }
        }
    }
}
