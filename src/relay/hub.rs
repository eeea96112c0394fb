// SPDX-License-Identifier: GPL-3.0-only

//! Broadcast hub for relay messages
//!
//! Devices and browser viewers connect to the same endpoint. Every text
//! message received from any client is sent to all connected clients;
//! clients whose send fails are dropped from the set. Upgrades on any path
//! other than `/frames` are closed right after the handshake.

use super::RelayError;
use crate::constants::RELAY_HUB_PATH;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_websockets::{Message, ServerBuilder, WebSocketStream};
use tracing::{debug, info, warn};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type Clients = Arc<RwLock<HashMap<SocketAddr, WsSink>>>;

/// Relay broadcast server
pub struct RelayHub {
    clients: Clients,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl RelayHub {
    /// Bind and start accepting connections in the background
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Connect(format!("bind failed: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::Connect(e.to_string()))?;

        let clients: Clients = Arc::new(RwLock::new(HashMap::new()));
        let accept_clients = Arc::clone(&clients);

        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((tcp_stream, addr)) => {
                        tokio::spawn(serve_client(tcp_stream, addr, Arc::clone(&accept_clients)));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept error");
                        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    }
                }
            }
        });

        info!(addr = %local_addr, path = RELAY_HUB_PATH, "Relay hub listening");
        Ok(Self {
            clients,
            accept_task,
            local_addr,
        })
    }

    /// Address the hub is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of currently connected clients
    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Send a text message to every client; returns how many received it
    pub async fn broadcast(&self, text: &str) -> usize {
        broadcast(&self.clients, Message::text(text.to_string())).await
    }
}

impl Drop for RelayHub {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_client(tcp_stream: TcpStream, addr: SocketAddr, clients: Clients) {
    let (request, mut ws_stream) = match ServerBuilder::new().accept(tcp_stream).await {
        Ok(accepted) => accepted,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    if request.uri().path() != RELAY_HUB_PATH {
        warn!(%addr, path = request.uri().path(), "Rejecting connection on unknown path");
        let _ = ws_stream.close().await;
        return;
    }

    let (writer, mut reader) = ws_stream.split();
    clients.write().await.insert(addr, writer);
    info!(%addr, "Relay client connected");

    loop {
        match reader.next().await {
            Some(Ok(msg)) => {
                if msg.is_text() {
                    let delivered = broadcast(&clients, msg).await;
                    debug!(%addr, delivered, "Relayed message");
                }
                // Binary and control frames are not relayed
            }
            Some(Err(e)) => {
                warn!(%addr, error = %e, "Relay client error");
                break;
            }
            None => break,
        }
    }

    clients.write().await.remove(&addr);
    info!(%addr, "Relay client disconnected");
}

async fn broadcast(clients: &Clients, msg: Message) -> usize {
    let mut lock = clients.write().await;
    let mut failed = Vec::new();

    for (addr, writer) in lock.iter_mut() {
        if let Err(e) = writer.send(msg.clone()).await {
            warn!(%addr, error = %e, "Failed to send to relay client");
            failed.push(*addr);
        }
    }

    for addr in &failed {
        lock.remove(addr);
    }
    lock.len()
}
