//! Interactive command handlers for tether.
//!
//! Handles `/` commands in interactive mode. Approving permissions and
//! confirming deletions happens only here, never through a model tool.

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use tether_core::Agent;

use crate::simple_output::SimpleOutput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Clear,
    Permissions,
    Approve(String),
    Deny(String),
    Deletions,
    Confirm(String),
    Cancel(String),
    /// Recognized command with a missing argument.
    Usage(&'static str),
    Unknown(String),
}

/// What the interactive loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlow {
    Continue,
    /// The session was cleared; start a new conversation id.
    NewSession,
    Quit,
}

/// Parse a line of input. Returns `None` for anything that is not a command.
pub fn parse_command(input: &str) -> Option<Command> {
    let input = input.trim();
    if matches!(input, "exit" | "quit") {
        return Some(Command::Quit);
    }
    let rest = input.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next().map(str::to_string);

    let with_id = |build: fn(String) -> Command, usage: &'static str| match arg.clone() {
        Some(id) => build(id),
        None => Command::Usage(usage),
    };

    Some(match name {
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "clear" => Command::Clear,
        "permissions" => Command::Permissions,
        "deletions" => Command::Deletions,
        "approve" => with_id(Command::Approve, "/approve <permission-id>"),
        "deny" => with_id(Command::Deny, "/deny <permission-id>"),
        "confirm" => with_id(Command::Confirm, "/confirm <deletion-id>"),
        "cancel" => with_id(Command::Cancel, "/cancel <deletion-id>"),
        other => Command::Unknown(other.to_string()),
    })
}

fn print_help(output: &SimpleOutput) {
    output.print("");
    output.print("Commands:");
    output.print("  /permissions        - List permission requests waiting for a decision");
    output.print("  /approve <id>       - Allow the requested path for this session");
    output.print("  /deny <id>          - Refuse the requested path for this session");
    output.print("  /deletions          - List deletions waiting for confirmation");
    output.print("  /confirm <id>       - Carry out a pending deletion");
    output.print("  /cancel <id>        - Discard a pending deletion");
    output.print("  /clear              - Forget this conversation and start fresh");
    output.print("  /help               - Show this help message");
    output.print("  /quit               - Exit (also: exit, quit, Ctrl-D)");
    output.print("");
    output.print("Ctrl-C while the agent is working cancels the current run.");
    output.print("");
}

fn print_ok(message: &str) {
    println!("{}✔{} {}", SetForegroundColor(Color::Green), ResetColor, message);
}

fn print_err(message: &str) {
    println!("{}✘{} {}", SetForegroundColor(Color::Red), ResetColor, message);
}

/// Run a parsed command against the agent for `session_id`.
pub async fn handle_command(
    command: Command,
    agent: &Agent,
    session_id: &str,
    output: &SimpleOutput,
) -> Result<CommandFlow> {
    match command {
        Command::Help => print_help(output),
        Command::Quit => return Ok(CommandFlow::Quit),
        Command::Clear => {
            agent.clear_session(session_id);
            print_ok("conversation cleared");
            return Ok(CommandFlow::NewSession);
        }
        Command::Permissions => {
            let pending = agent.pending_permissions(session_id);
            if pending.is_empty() {
                output.print("No permission requests.");
            }
            for p in pending {
                output.print(&format!(
                    "  {}  {:<7} {}  ({})",
                    p.id, p.operation.as_str(), p.path, p.reason
                ));
            }
        }
        Command::Approve(id) => match agent.approve(&id) {
            Ok(p) => print_ok(&format!("{} allowed for this session", p.path)),
            Err(e) => print_err(&e.to_string()),
        },
        Command::Deny(id) => match agent.deny(&id) {
            Ok(p) => print_ok(&format!("{} denied for this session", p.path)),
            Err(e) => print_err(&e.to_string()),
        },
        Command::Deletions => {
            let pending = agent.pending_deletions(session_id);
            if pending.is_empty() {
                output.print("No pending deletions.");
            }
            for d in pending {
                let kind = if d.is_directory {
                    format!("directory, {} file(s)", d.file_count)
                } else {
                    "file".to_string()
                };
                output.print(&format!(
                    "  {}  {}  ({}, {} bytes): {}",
                    d.id,
                    d.path.display(),
                    kind,
                    d.size,
                    d.reason
                ));
            }
        }
        Command::Confirm(id) => match agent.confirm_deletion(&id).await {
            Ok(d) => print_ok(&format!("deleted {}", d.path.display())),
            Err(e) => print_err(&e.to_string()),
        },
        Command::Cancel(id) => match agent.cancel_deletion(&id) {
            Ok(d) => print_ok(&format!("kept {}", d.path.display())),
            Err(e) => print_err(&e.to_string()),
        },
        Command::Usage(usage) => output.print(&format!("Usage: {}", usage)),
        Command::Unknown(name) => {
            output.print(&format!("Unknown command: /{} (try /help)", name));
        }
    }
    Ok(CommandFlow::Continue)
}
