//! tether CLI - command-line front end for the tether agent runtime.

mod cli_args;
mod commands;
mod display;
mod interactive;
mod simple_output;
mod task_execution;
mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tether_bridge::{BridgeServer, BrowserCommands, RemoteCommandBridge};
use tether_config::BridgeConfig;
use tether_core::Agent;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use cli_args::Cli;

use display::EventRenderer;
use interactive::{new_session_id, run_interactive};
use task_execution::execute_task;
use utils::{initialize_logging, load_config_with_cli_overrides};

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(cli.verbose);

    let config = load_config_with_cli_overrides(&cli)?;
    let shutdown = CancellationToken::new();

    let (browser, bridge_url) = if config.bridge.enabled {
        match start_bridge(&config.bridge, shutdown.clone()).await {
            Ok((bridge, addr)) => (
                Some(Arc::new(bridge) as Arc<dyn BrowserCommands>),
                Some(format!("ws://{}/ws", addr)),
            ),
            Err(e) => {
                warn!("Browser tools disabled: {:#}", e);
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    let agent = Agent::from_config(&config, browser)?;
    info!(
        "Using {} ({}) in {}",
        agent.provider().name(),
        agent.provider().model(),
        agent.working_dir().display()
    );

    let result = match cli.task {
        Some(task) => {
            let mut renderer = EventRenderer::new(cli.json);
            let succeeded = execute_task(&agent, &new_session_id(), &task, &mut renderer).await;
            if succeeded {
                Ok(())
            } else {
                Err(anyhow::anyhow!("run did not complete"))
            }
        }
        None => run_interactive(agent, bridge_url, cli.json).await,
    };

    shutdown.cancel();
    result
}

/// Bind the WebSocket server the browser extension connects to.
async fn start_bridge(
    config: &BridgeConfig,
    shutdown: CancellationToken,
) -> Result<(RemoteCommandBridge, SocketAddr)> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bridge address {}:{}", config.bind_address, config.port))?;

    let bridge = RemoteCommandBridge::spawn(Duration::from_secs(config.request_timeout_secs));
    let server = BridgeServer::bind(addr, bridge.clone()).await?;
    let local = server.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = server.run(shutdown).await {
            error!("Bridge server stopped: {:#}", e);
        }
    });
    Ok((bridge, local))
}
