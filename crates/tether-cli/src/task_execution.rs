//! Running one user message through the agent from the terminal.

use tether_core::{Agent, AgentEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::display::EventRenderer;

/// Send `text` on `session_id` and render events until the run ends.
/// Ctrl-C cancels the run; the terminal event still arrives and is rendered.
/// Returns false if the run ended with an error.
pub async fn execute_task(
    agent: &Agent,
    session_id: &str,
    text: &str,
    renderer: &mut EventRenderer,
) -> bool {
    let cancel = CancellationToken::new();
    let mut events = agent.run(session_id, text, cancel.clone());
    let mut succeeded = false;
    let mut listening = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if matches!(event, AgentEvent::Done { .. }) {
                    succeeded = true;
                }
                renderer.render(&event);
            }
            signal = tokio::signal::ctrl_c(), if listening && !cancel.is_cancelled() => {
                match signal {
                    Ok(()) => {
                        debug!("Ctrl-C: cancelling run on {}", session_id);
                        cancel.cancel();
                    }
                    Err(e) => {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                        listening = false;
                    }
                }
            }
        }
    }
    succeeded
}
