//! Regex search across files under a directory.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::dispatch::{ToolError, ToolHandler};
use crate::sandbox::Operation;

use super::context::WalkGate;
use super::ToolContext;

const SKIPPED_DIRS: &[&str] = &[".git", "target", "node_modules"];
const MAX_FILE_BYTES: u64 = 2 * 1024 * 1024;
const MAX_LINE_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
pub struct SearchFilesInput {
    pub path: String,
    pub pattern: String,
    /// Regex applied to file names.
    #[serde(default)]
    pub file_pattern: Option<String>,
    #[serde(default)]
    pub max_results: Option<usize>,
}

pub struct SearchFiles;

fn compile(pattern: &str, what: &str) -> Result<Regex, ToolError> {
    Regex::new(pattern).map_err(|e| ToolError::InvalidInput(format!("invalid {}: {}", what, e)))
}

fn is_skipped(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| SKIPPED_DIRS.contains(&name))
}

#[async_trait]
impl ToolHandler for SearchFiles {
    type Input = SearchFilesInput;

    fn validate(&self, input: &SearchFilesInput) -> Result<(), ToolError> {
        compile(&input.pattern, "pattern")?;
        if let Some(file_pattern) = &input.file_pattern {
            compile(file_pattern, "file_pattern")?;
        }
        Ok(())
    }

    async fn run(&self, input: SearchFilesInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let root = ctx.authorize(&input.path, Operation::Search)?;
        let pattern = compile(&input.pattern, "pattern")?;
        let file_pattern = input
            .file_pattern
            .as_deref()
            .map(|p| compile(p, "file_pattern"))
            .transpose()?;
        let limit = input
            .max_results
            .unwrap_or(ctx.limits.max_search_results)
            .min(ctx.limits.max_search_results);

        debug!("Searching {} for /{}/", root.display(), input.pattern);
        let walk_root = root.clone();
        let mut guard = ctx.walk_gate(&root, Operation::Search);
        let (matches, truncated, withheld) = tokio::task::spawn_blocking(move || {
            let (matches, truncated) =
                search(&walk_root, &pattern, file_pattern.as_ref(), limit, &mut guard);
            (matches, truncated, guard.into_withheld())
        })
        .await
        .map_err(|e| ToolError::Failed(format!("search failed: {}", e)))?;

        Ok(json!({
            "path": root.to_string_lossy(),
            "pattern": input.pattern,
            "matches": matches,
            "truncated": truncated,
            "withheld": withheld,
        }))
    }
}

fn search(
    root: &Path,
    pattern: &Regex,
    file_pattern: Option<&Regex>,
    limit: usize,
    guard: &mut WalkGate,
) -> (Vec<Value>, bool) {
    let mut matches = Vec::new();
    let files = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped(e) && guard.admit(e))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file());

    for entry in files {
        if let Some(file_pattern) = file_pattern {
            let name = entry.file_name().to_string_lossy();
            if !file_pattern.is_match(&name) {
                continue;
            }
        }
        if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
            continue;
        }
        let Ok(bytes) = std::fs::read(entry.path()) else {
            continue;
        };
        // Binary files are skipped
        if bytes.contains(&0) {
            continue;
        }
        let text = String::from_utf8_lossy(&bytes);
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .into_owned();

        for (number, line) in text.lines().enumerate() {
            if !pattern.is_match(line) {
                continue;
            }
            if matches.len() >= limit {
                return (matches, true);
            }
            let line: String = line.chars().take(MAX_LINE_CHARS).collect();
            matches.push(json!({
                "file": relative,
                "line": number + 1,
                "text": line,
            }));
        }
    }
    (matches, false)
}
