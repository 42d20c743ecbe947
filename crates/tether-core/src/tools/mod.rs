//! Tool implementations the agent can execute.
//!
//! - `file_ops` - reading, writing, editing and listing files
//! - `search` - regex search over a directory tree
//! - `shell` - shell commands
//! - `web` - HTTP fetch
//! - `browser` - browser commands over the bridge
//! - `delete` - deletion requests (two-phase)

pub mod browser;
pub mod context;
pub mod delete;
pub mod file_ops;
pub mod search;
pub mod shell;
pub mod web;

pub use context::ToolContext;
