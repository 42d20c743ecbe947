//! Interactive mode for tether CLI.

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tether_core::Agent;
use tracing::{debug, error};

use crate::commands::{handle_command, parse_command, CommandFlow};
use crate::display::{format_workspace_path, EventRenderer};
use crate::simple_output::SimpleOutput;
use crate::task_execution::execute_task;

pub fn new_session_id() -> String {
    format!("cli-{}", uuid::Uuid::new_v4())
}

/// Build the interactive prompt. Pending decisions are shown as a count so
/// the user notices the agent is waiting on them.
pub fn build_prompt(in_multiline: bool, pending_permissions: usize, pending_deletions: usize) -> String {
    if in_multiline {
        return "... > ".to_string();
    }
    let waiting = pending_permissions + pending_deletions;
    if waiting == 0 {
        return "tether> ".to_string();
    }
    // ANSI codes are wrapped in \x01...\x02 so rustyline ignores them when measuring the prompt
    let yellow = format!("\x01{}\x02", SetForegroundColor(Color::Yellow));
    let reset = format!("\x01{}\x02", ResetColor);
    format!("tether {}[{} pending]{}> ", yellow, waiting, reset)
}

pub async fn run_interactive(agent: Agent, bridge_url: Option<String>, json: bool) -> Result<()> {
    let output = SimpleOutput::new();

    output.print("");
    output.print("tether");
    print!(
        "🔧 {}{}{} | {}{}{}\n",
        SetForegroundColor(Color::Cyan),
        agent.provider().name(),
        ResetColor,
        SetForegroundColor(Color::Yellow),
        agent.provider().model(),
        ResetColor
    );
    output.print(&format!("📁 {}", format_workspace_path(agent.working_dir())));
    if let Some(url) = bridge_url {
        output.print(&format!("🌐 browser bridge at {}", url));
    }
    output.print("Type /help for commands.");
    output.print("");

    let mut rl = DefaultEditor::new()?;
    let history_file = dirs::home_dir().map(|mut path| {
        path.push(".tether_history");
        path
    });
    if let Some(ref history_path) = history_file {
        let _ = rl.load_history(history_path);
    }

    let mut renderer = EventRenderer::new(json);
    let mut session_id = new_session_id();
    let mut multiline_buffer = String::new();
    let mut in_multiline = false;

    loop {
        let prompt = build_prompt(
            in_multiline,
            agent.pending_permissions(&session_id).len(),
            agent.pending_deletions(&session_id).len(),
        );

        match rl.readline(&prompt) {
            Ok(line) => {
                let trimmed = line.trim_end();

                // A trailing backslash continues the input on the next line
                if let Some(without_backslash) = trimmed.strip_suffix('\\') {
                    multiline_buffer.push_str(without_backslash);
                    multiline_buffer.push('\n');
                    in_multiline = true;
                    continue;
                }

                let input = if in_multiline {
                    multiline_buffer.push_str(trimmed);
                    in_multiline = false;
                    std::mem::take(&mut multiline_buffer)
                } else {
                    trimmed.to_string()
                };
                let input = input.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                if let Some(command) = parse_command(input) {
                    match handle_command(command, &agent, &session_id, &output).await? {
                        CommandFlow::Continue => {}
                        CommandFlow::NewSession => session_id = new_session_id(),
                        CommandFlow::Quit => break,
                    }
                    continue;
                }

                execute_task(&agent, &session_id, input, &mut renderer).await;
                output.print("");
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C at the prompt clears the current input
                multiline_buffer.clear();
                in_multiline = false;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                error!("Readline error: {}", e);
                break;
            }
        }
    }

    if let Some(ref history_path) = history_file {
        if let Err(e) = rl.save_history(history_path) {
            debug!("Could not save history: {}", e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_shows_pending_count() {
        assert_eq!(build_prompt(false, 0, 0), "tether> ");
        assert_eq!(build_prompt(true, 3, 0), "... > ");
        let prompt = build_prompt(false, 1, 2);
        assert!(prompt.contains("[3 pending]"));
        assert!(prompt.starts_with("tether "));
    }

    #[test]
    fn test_session_ids_are_unique() {
        assert_ne!(new_session_id(), new_session_id());
    }
}
