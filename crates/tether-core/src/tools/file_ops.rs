//! File operation tools: read_file, write_file, edit_file, list_directory.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

use crate::dispatch::{ToolError, ToolHandler};
use crate::sandbox::Operation;

use super::ToolContext;

const DEFAULT_MAX_ENTRIES: usize = 500;

fn default_max_entries() -> usize {
    DEFAULT_MAX_ENTRIES
}

fn require_path(path: &str) -> Result<(), ToolError> {
    if path.trim().is_empty() {
        return Err(ToolError::InvalidInput("path must not be empty".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct ReadFileInput {
    pub path: String,
    /// First line to return, 1-based.
    #[serde(default)]
    pub offset_line: Option<usize>,
    #[serde(default)]
    pub max_lines: Option<usize>,
}

pub struct ReadFile;

#[async_trait]
impl ToolHandler for ReadFile {
    type Input = ReadFileInput;

    fn validate(&self, input: &ReadFileInput) -> Result<(), ToolError> {
        require_path(&input.path)?;
        if input.offset_line == Some(0) {
            return Err(ToolError::InvalidInput("offset_line is 1-based".to_string()));
        }
        Ok(())
    }

    async fn run(&self, input: ReadFileInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = ctx.authorize(&input.path, Operation::Read)?;
        debug!("Reading file: {}", path.display());

        let content = tokio::fs::read_to_string(&path).await?;
        let total_lines = content.lines().count();
        let start = input.offset_line.unwrap_or(1) - 1;
        let selected: Vec<&str> = content
            .lines()
            .skip(start)
            .take(input.max_lines.unwrap_or(usize::MAX))
            .collect();

        let partial = start > 0 || selected.len() < total_lines;
        let text = if partial {
            selected.join("\n")
        } else {
            content.clone()
        };
        let (text, truncated) = ctx.truncate(&text);

        Ok(json!({
            "path": path.to_string_lossy(),
            "content": text,
            "start_line": start + 1,
            "lines_read": selected.len(),
            "total_lines": total_lines,
            "truncated": truncated,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct WriteFileInput {
    pub path: String,
    pub content: String,
    #[serde(default)]
    pub append: bool,
}

pub struct WriteFile;

#[async_trait]
impl ToolHandler for WriteFile {
    type Input = WriteFileInput;

    fn validate(&self, input: &WriteFileInput) -> Result<(), ToolError> {
        require_path(&input.path)
    }

    async fn run(&self, input: WriteFileInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = ctx.authorize(&input.path, Operation::Write)?;
        debug!("Writing {} bytes to {}", input.content.len(), path.display());

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if input.append {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(input.content.as_bytes()).await?;
            file.flush().await?;
        } else {
            tokio::fs::write(&path, &input.content).await?;
        }

        Ok(json!({
            "path": path.to_string_lossy(),
            "bytes_written": input.content.len(),
            "lines": input.content.lines().count(),
            "appended": input.append,
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct EditFileInput {
    pub path: String,
    pub old_text: String,
    pub new_text: String,
}

pub struct EditFile;

#[async_trait]
impl ToolHandler for EditFile {
    type Input = EditFileInput;

    fn validate(&self, input: &EditFileInput) -> Result<(), ToolError> {
        require_path(&input.path)?;
        if input.old_text.is_empty() {
            return Err(ToolError::InvalidInput("old_text must not be empty".to_string()));
        }
        Ok(())
    }

    async fn run(&self, input: EditFileInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let path = ctx.authorize(&input.path, Operation::Write)?;
        let content = tokio::fs::read_to_string(&path).await?;

        match content.matches(&input.old_text).count() {
            0 => {
                return Err(ToolError::Failed(format!(
                    "old_text not found in {}",
                    path.display()
                )))
            }
            1 => {}
            n => {
                return Err(ToolError::Failed(format!(
                    "old_text matches {} places in {}; include more context so it matches exactly once",
                    n,
                    path.display()
                )))
            }
        }

        let updated = content.replacen(&input.old_text, &input.new_text, 1);
        tokio::fs::write(&path, &updated).await?;

        Ok(json!({
            "path": path.to_string_lossy(),
            "removed_lines": input.old_text.lines().count(),
            "added_lines": input.new_text.lines().count(),
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListDirectoryInput {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

pub struct ListDirectory;

#[async_trait]
impl ToolHandler for ListDirectory {
    type Input = ListDirectoryInput;

    fn validate(&self, input: &ListDirectoryInput) -> Result<(), ToolError> {
        require_path(&input.path)
    }

    async fn run(&self, input: ListDirectoryInput, ctx: &ToolContext) -> Result<Value, ToolError> {
        let root = ctx.authorize(&input.path, Operation::List)?;
        if !tokio::fs::metadata(&root).await?.is_dir() {
            return Err(ToolError::Failed(format!("{} is not a directory", root.display())));
        }

        let max_depth = if input.recursive { usize::MAX } else { 1 };
        let max_entries = input.max_entries;
        let walk_root = root.clone();
        let mut guard = ctx.walk_gate(&root, Operation::List);
        let (entries, truncated, withheld) = tokio::task::spawn_blocking(move || {
            let mut entries = Vec::new();
            let mut truncated = false;
            let walker = WalkDir::new(&walk_root)
                .max_depth(max_depth)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| guard.admit(e))
                .filter_map(Result::ok)
                .filter(|e| e.depth() > 0);
            for entry in walker {
                if entries.len() >= max_entries {
                    truncated = true;
                    break;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&walk_root)
                    .unwrap_or(entry.path())
                    .to_string_lossy()
                    .into_owned();
                let is_dir = entry.file_type().is_dir();
                let size = if is_dir {
                    None
                } else {
                    entry.metadata().ok().map(|m| m.len())
                };
                entries.push(json!({
                    "path": relative,
                    "type": if is_dir { "directory" } else { "file" },
                    "size": size,
                }));
            }
            (entries, truncated, guard.into_withheld())
        })
        .await
        .map_err(|e| ToolError::Failed(format!("directory walk failed: {}", e)))?;

        Ok(json!({
            "path": root.to_string_lossy(),
            "entries": entries,
            "truncated": truncated,
            "withheld": withheld,
        }))
    }
}
