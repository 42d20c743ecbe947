//! WebSocket edge for the bridge.
//!
//! Each accepted socket is attached to the [`RemoteCommandBridge`]; frames
//! flow between the socket and the actor until either side closes.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::RemoteCommandBridge;

pub struct BridgeServer {
    listener: TcpListener,
    bridge: RemoteCommandBridge,
}

impl BridgeServer {
    pub async fn bind(addr: SocketAddr, bridge: RemoteCommandBridge) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind bridge server on {}", addr))?;
        Ok(Self { listener, bridge })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        let app = router(self.bridge);
        info!("Browser bridge listening on ws://{}/ws", addr);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .context("Bridge server failed")
    }
}

pub fn router(bridge: RemoteCommandBridge) -> Router {
    Router::new()
        .route("/ws", get(handle_upgrade))
        .route("/", get(handle_upgrade))
        .with_state(bridge)
}

async fn handle_upgrade(
    ws: WebSocketUpgrade,
    State(bridge): State<RemoteCommandBridge>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, bridge))
}

async fn handle_socket(socket: WebSocket, bridge: RemoteCommandBridge) {
    let (conn_id, mut frames) = bridge.attach();
    info!("Bridge WebSocket connection established: {}", conn_id);

    let (mut sender, mut receiver) = socket.split();

    // Forward actor frames to the socket; ends when the actor drops us
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = frames.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let inbound_bridge = bridge.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => inbound_bridge.deliver(conn_id, text),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    bridge.detach(conn_id);
    debug!("Bridge WebSocket connection closed: {}", conn_id);
}
