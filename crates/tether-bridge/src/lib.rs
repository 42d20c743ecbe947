//! Remote command bridge to a browser automation client.
//!
//! The client (typically a browser extension) connects over a WebSocket and
//! executes commands such as `navigate` or `click`. Each command carries a
//! monotonically increasing id; responses may arrive in any order and are
//! matched back to the waiting caller by that id. Every request is bounded by
//! a timeout.

mod bridge;
pub mod browser;
pub mod envelope;
pub mod server;

use std::time::Duration;

pub use bridge::{ConnectionId, RemoteCommandBridge};
pub use browser::{BrowserAction, BrowserCommands};
pub use server::BridgeServer;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("browser bridge is not connected")]
    NotConnected,
    #[error("browser command '{action}' timed out after {after:?}")]
    Timeout { action: String, after: Duration },
    #[error("browser reported an error: {0}")]
    Remote(String),
    #[error("failed to encode command: {0}")]
    Encode(String),
    #[error("browser bridge has shut down")]
    ShutDown,
}
