//! CLI argument parsing for tether.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(name = "tether")]
#[command(about = "Run a model against your files, shell and browser, with a human in the loop")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Working directory for relative tool paths (defaults to current directory)
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// Task to execute (if provided, runs in single-shot mode instead of interactive)
    pub task: Option<String>,

    /// Override the configured provider (e.g., 'anthropic.default')
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Override the model for the selected provider
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Maximum provider calls per run
    #[arg(long, value_name = "N")]
    pub max_turns: Option<u32>,

    /// Do not start the browser bridge
    #[arg(long)]
    pub no_bridge: bool,

    /// Port for the browser bridge WebSocket server
    #[arg(long, value_name = "PORT")]
    pub bridge_port: Option<u16>,

    /// Print agent events as JSON lines instead of formatted text
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_interactive() {
        let cli = Cli::try_parse_from(["tether"]).unwrap();
        assert!(cli.task.is_none());
        assert!(!cli.no_bridge);
        assert!(cli.max_turns.is_none());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from([
            "tether",
            "--provider",
            "anthropic.fast",
            "--max-turns",
            "7",
            "--no-bridge",
            "--bridge-port",
            "9000",
            "-w",
            "/tmp/ws",
            "list the files",
        ])
        .unwrap();
        assert_eq!(cli.task.as_deref(), Some("list the files"));
        assert_eq!(cli.provider.as_deref(), Some("anthropic.fast"));
        assert_eq!(cli.max_turns, Some(7));
        assert!(cli.no_bridge);
        assert_eq!(cli.bridge_port, Some(9000));
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn test_rejects_bad_port() {
        assert!(Cli::try_parse_from(["tether", "--bridge-port", "99999"]).is_err());
    }
}
