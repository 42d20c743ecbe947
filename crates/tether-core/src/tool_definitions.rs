//! Tool definitions for the agent's available tools.
//!
//! JSON schemas handed to the provider as-is. Inputs are not checked against
//! them; each handler deserializes its own typed input.

use serde_json::json;
use tether_providers::Tool;

use crate::dispatch::ToolKind;

fn tool(kind: ToolKind, description: &str, input_schema: serde_json::Value) -> Tool {
    Tool {
        name: kind.name().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

/// Create tool definitions for native tool calling providers.
///
/// Browser tools are only offered when a bridge is configured.
pub fn create_tool_definitions(include_browser: bool) -> Vec<Tool> {
    ToolKind::ALL
        .into_iter()
        .filter(|kind| include_browser || !kind.is_browser())
        .map(definition)
        .collect()
}

fn definition(kind: ToolKind) -> Tool {
    match kind {
        ToolKind::ReadFile => tool(
            kind,
            "Read a text file. Use offset_line and max_lines to read part of a large file.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path, absolute or relative to the working directory" },
                    "offset_line": { "type": "integer", "minimum": 1, "description": "First line to read (1-based)" },
                    "max_lines": { "type": "integer", "minimum": 1, "description": "Maximum number of lines to return" }
                },
                "required": ["path"]
            }),
        ),
        ToolKind::WriteFile => tool(
            kind,
            "Write content to a file, creating parent directories. Overwrites unless append is true.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" },
                    "append": { "type": "boolean", "default": false }
                },
                "required": ["path", "content"]
            }),
        ),
        ToolKind::EditFile => tool(
            kind,
            "Replace old_text with new_text in a file. old_text must match exactly once.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "old_text": { "type": "string", "description": "Exact text to replace, with enough context to be unique" },
                    "new_text": { "type": "string" }
                },
                "required": ["path", "old_text", "new_text"]
            }),
        ),
        ToolKind::ListDirectory => tool(
            kind,
            "List the entries of a directory.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "recursive": { "type": "boolean", "default": false },
                    "max_entries": { "type": "integer", "minimum": 1, "default": 500 }
                },
                "required": ["path"]
            }),
        ),
        ToolKind::SearchFiles => tool(
            kind,
            "Search file contents under a directory with a regular expression. Skips .git, target, node_modules and binary files.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory to search" },
                    "pattern": { "type": "string", "description": "Regular expression matched against each line" },
                    "file_pattern": { "type": "string", "description": "Regular expression matched against file names" },
                    "max_results": { "type": "integer", "minimum": 1 }
                },
                "required": ["path", "pattern"]
            }),
        ),
        ToolKind::RunShell => tool(
            kind,
            "Run a shell command with bash. Returns exit code, stdout and stderr.",
            json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string" },
                    "working_dir": { "type": "string", "description": "Directory to run in; defaults to the working directory" },
                    "timeout_secs": { "type": "integer", "minimum": 1 }
                },
                "required": ["command"]
            }),
        ),
        ToolKind::WebFetch => tool(
            kind,
            "Fetch a URL over http or https and return the response body as text.",
            json!({
                "type": "object",
                "properties": {
                    "url": { "type": "string" },
                    "max_bytes": { "type": "integer", "minimum": 1 }
                },
                "required": ["url"]
            }),
        ),
        ToolKind::BrowserNavigate => tool(
            kind,
            "Navigate the connected browser's active tab to a URL.",
            json!({
                "type": "object",
                "properties": { "url": { "type": "string" } },
                "required": ["url"]
            }),
        ),
        ToolKind::BrowserClick => tool(
            kind,
            "Click the first element matching a CSS selector in the connected browser.",
            json!({
                "type": "object",
                "properties": { "selector": { "type": "string" } },
                "required": ["selector"]
            }),
        ),
        ToolKind::BrowserType => tool(
            kind,
            "Type text into the element matching a CSS selector, optionally submitting it.",
            json!({
                "type": "object",
                "properties": {
                    "selector": { "type": "string" },
                    "text": { "type": "string" },
                    "submit": { "type": "boolean", "default": false }
                },
                "required": ["selector", "text"]
            }),
        ),
        ToolKind::BrowserReadPage => tool(
            kind,
            "Read the text content of the current page, or of one element.",
            json!({
                "type": "object",
                "properties": { "selector": { "type": "string" } }
            }),
        ),
        ToolKind::BrowserScreenshot => tool(
            kind,
            "Capture a screenshot of the visible tab.",
            json!({ "type": "object", "properties": {} }),
        ),
        ToolKind::BrowserEvaluate => tool(
            kind,
            "Evaluate JavaScript in the current page and return the result.",
            json!({
                "type": "object",
                "properties": { "script": { "type": "string" } },
                "required": ["script"]
            }),
        ),
        ToolKind::DeletePath => tool(
            kind,
            "Request deletion of a file or directory. Nothing is deleted until the user confirms the returned deletion id.",
            json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "recursive": { "type": "boolean", "default": false, "description": "Required for non-empty directories" },
                    "reason": { "type": "string", "description": "Why the deletion is needed, shown to the user" }
                },
                "required": ["path", "reason"]
            }),
        ),
    }
}
