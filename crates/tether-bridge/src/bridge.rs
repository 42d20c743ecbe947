//! The bridge actor.
//!
//! One task owns the active connection and the table of outstanding
//! requests. Callers, the WebSocket edge and per-request timers talk to it
//! through a command channel, so "response arrived", "timed out" and
//! "connection closed" are processed one at a time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::envelope::{parse_inbound, registered_ack, CommandEnvelope, Inbound};
use crate::BridgeError;

/// Identifies one attached client connection.
pub type ConnectionId = u64;

enum Command {
    Send {
        action: String,
        params: Value,
        reply: oneshot::Sender<Result<Value, BridgeError>>,
    },
    Expire {
        id: u64,
    },
    Attach {
        conn_id: ConnectionId,
        outbound: mpsc::UnboundedSender<String>,
    },
    Detach {
        conn_id: ConnectionId,
    },
    Inbound {
        conn_id: ConnectionId,
        text: String,
    },
    PendingCount {
        reply: oneshot::Sender<usize>,
    },
}

struct PendingRequest {
    action: String,
    reply: oneshot::Sender<Result<Value, BridgeError>>,
    timer: JoinHandle<()>,
}

struct Connection {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<String>,
}

struct BridgeActor {
    commands: mpsc::UnboundedReceiver<Command>,
    /// Used by timers to report expiry back to the actor.
    loopback: mpsc::WeakUnboundedSender<Command>,
    connection: Option<Connection>,
    pending: HashMap<u64, PendingRequest>,
    next_id: u64,
    timeout: Duration,
    connected: watch::Sender<bool>,
}

impl BridgeActor {
    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!(
            "Bridge actor stopped with {} pending request(s)",
            self.pending.len()
        );
        for (_, request) in self.pending.drain() {
            request.timer.abort();
            let _ = request.reply.send(Err(BridgeError::ShutDown));
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Send {
                action,
                params,
                reply,
            } => self.send(action, params, reply),
            Command::Expire { id } => {
                if let Some(request) = self.pending.remove(&id) {
                    warn!(
                        "Bridge request {} ({}) timed out after {:?}",
                        id, request.action, self.timeout
                    );
                    let _ = request.reply.send(Err(BridgeError::Timeout {
                        action: request.action,
                        after: self.timeout,
                    }));
                }
            }
            Command::Attach { conn_id, outbound } => {
                if let Some(previous) = self.connection.replace(Connection {
                    id: conn_id,
                    outbound,
                }) {
                    info!(
                        "Bridge connection {} replaced by {}",
                        previous.id, conn_id
                    );
                } else {
                    info!("Bridge connection {} attached", conn_id);
                }
                self.connected.send_replace(true);
            }
            Command::Detach { conn_id } => {
                if self.connection.as_ref().is_some_and(|c| c.id == conn_id) {
                    self.disconnect();
                }
            }
            Command::Inbound { conn_id, text } => self.inbound(conn_id, &text),
            Command::PendingCount { reply } => {
                let _ = reply.send(self.pending.len());
            }
        }
    }

    fn send(
        &mut self,
        action: String,
        params: Value,
        reply: oneshot::Sender<Result<Value, BridgeError>>,
    ) {
        let Some(connection) = &self.connection else {
            let _ = reply.send(Err(BridgeError::NotConnected));
            return;
        };

        let id = self.next_id;
        self.next_id += 1;

        let envelope = CommandEnvelope {
            id,
            action: action.clone(),
            params,
        };
        let text = match serde_json::to_string(&envelope) {
            Ok(text) => text,
            Err(e) => {
                let _ = reply.send(Err(BridgeError::Encode(e.to_string())));
                return;
            }
        };

        if connection.outbound.send(text).is_err() {
            // The socket task is gone but has not detached yet
            self.disconnect();
            let _ = reply.send(Err(BridgeError::NotConnected));
            return;
        }
        debug!("Bridge request {} sent: {}", id, action);

        let loopback = self.loopback.clone();
        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(commands) = loopback.upgrade() {
                let _ = commands.send(Command::Expire { id });
            }
        });

        self.pending.insert(
            id,
            PendingRequest {
                action,
                reply,
                timer,
            },
        );
    }

    fn inbound(&mut self, conn_id: ConnectionId, text: &str) {
        let Some(connection) = self.connection.as_ref().filter(|c| c.id == conn_id) else {
            debug!("Ignoring message from stale connection {}", conn_id);
            return;
        };

        match parse_inbound(text) {
            Ok(Inbound::Register { client }) => {
                info!(
                    "Bridge client registered: {}",
                    client.as_deref().unwrap_or("unnamed")
                );
                let _ = connection.outbound.send(registered_ack());
            }
            Ok(Inbound::Response { id, outcome }) => match self.pending.remove(&id) {
                Some(request) => {
                    request.timer.abort();
                    debug!("Bridge request {} ({}) resolved", id, request.action);
                    let _ = request.reply.send(outcome.map_err(BridgeError::Remote));
                }
                None => debug!("Response for unknown or expired request {}", id),
            },
            Ok(Inbound::Other(kind)) => debug!("Ignoring bridge message of type {}", kind),
            Err(e) => warn!("Malformed bridge message ({}): {}", e, text),
        }
    }

    /// Drop the connection. Outstanding requests are left to their timers.
    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            info!(
                "Bridge connection {} closed with {} request(s) outstanding",
                connection.id,
                self.pending.len()
            );
        }
        self.connected.send_replace(false);
    }
}

/// Handle to the bridge actor. Cheap to clone.
#[derive(Clone)]
pub struct RemoteCommandBridge {
    commands: mpsc::UnboundedSender<Command>,
    connected: watch::Receiver<bool>,
    next_conn_id: Arc<AtomicU64>,
}

impl RemoteCommandBridge {
    /// Spawn the actor on the current runtime.
    pub fn spawn(timeout: Duration) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (connected_tx, connected_rx) = watch::channel(false);

        let actor = BridgeActor {
            commands: commands_rx,
            loopback: commands_tx.downgrade(),
            connection: None,
            pending: HashMap::new(),
            next_id: 1,
            timeout,
            connected: connected_tx,
        };
        tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            connected: connected_rx,
            next_conn_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Send a command to the client and wait for its response or the timeout.
    pub async fn send(&self, action: &str, params: Value) -> Result<Value, BridgeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Send {
                action: action.to_string(),
                params,
                reply,
            })
            .map_err(|_| BridgeError::ShutDown)?;
        response.await.map_err(|_| BridgeError::ShutDown)?
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Watch connection state changes.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    /// Register a new client connection, replacing any current one.
    /// Frames to write to the client arrive on the returned receiver.
    pub fn attach(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let (outbound, frames) = mpsc::unbounded_channel();
        let _ = self.commands.send(Command::Attach { conn_id, outbound });
        (conn_id, frames)
    }

    /// Hand a text frame received from the client to the actor.
    pub fn deliver(&self, conn_id: ConnectionId, text: String) {
        let _ = self.commands.send(Command::Inbound { conn_id, text });
    }

    pub fn detach(&self, conn_id: ConnectionId) {
        let _ = self.commands.send(Command::Detach { conn_id });
    }

    /// Number of requests awaiting a response.
    pub async fn pending_count(&self) -> usize {
        let (reply, count) = oneshot::channel();
        if self.commands.send(Command::PendingCount { reply }).is_err() {
            return 0;
        }
        count.await.unwrap_or(0)
    }
}
