//! Utility functions for tether CLI.

use anyhow::Result;
use tether_config::Config;

use crate::cli_args::Cli;

const TETHER_CRATES: [&str; 7] = [
    "tether",
    "tether_cli",
    "tether_core",
    "tether_providers",
    "tether_execution",
    "tether_bridge",
    "tether_config",
];

/// Load configuration with CLI argument overrides applied.
pub fn load_config_with_cli_overrides(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_with_overrides(
        cli.config.as_deref(),
        cli.provider.clone(),
        cli.model.clone(),
    )?;

    if let Some(max_turns) = cli.max_turns {
        config.agent.max_turns = max_turns;
    }
    if let Some(workspace) = &cli.workspace {
        config.agent.working_dir = Some(workspace.to_string_lossy().into_owned());
    }
    if cli.no_bridge {
        config.bridge.enabled = false;
    }
    if let Some(port) = cli.bridge_port {
        config.bridge.port = port;
    }

    config.validate()?;
    Ok(config)
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_log_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    let mut directives = vec!["warn".to_string()];
    directives.extend(TETHER_CRATES.iter().map(|name| format!("{}={}", name, level)));
    directives.join(",")
}

/// Initialize logging based on CLI verbosity settings. Logs go to stderr so
/// stdout carries only the agent's output.
pub fn initialize_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_directives(verbose)));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_default_log_directives() {
        let quiet = default_log_directives(false);
        assert!(quiet.starts_with("warn,"));
        assert!(quiet.contains("tether_core=info"));
        assert!(default_log_directives(true).contains("tether_bridge=debug"));
    }

    #[test]
    fn test_cli_overrides_apply_to_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tether.toml");
        Config::default().save(&path).unwrap();

        let cli = Cli::try_parse_from([
            "tether",
            "--config",
            path.to_str().unwrap(),
            "--max-turns",
            "4",
            "--no-bridge",
            "--bridge-port",
            "9100",
            "--model",
            "claude-haiku",
        ])
        .unwrap();
        let config = load_config_with_cli_overrides(&cli).unwrap();
        assert_eq!(config.agent.max_turns, 4);
        assert!(!config.bridge.enabled);
        assert_eq!(config.bridge.port, 9100);
        assert_eq!(config.providers.anthropic["default"].model, "claude-haiku");
    }
}
