// SPDX-License-Identifier: GPL-3.0-only

//! WebSocket client sink
//!
//! The connection is owned by a tokio task. Callers hand messages over
//! through a small bounded queue with `try_send`, so the frame worker never
//! waits on the network; when the queue is full the message is dropped. Any
//! transport error ends the task and the client reports itself disconnected.
//! There is no reconnect.

use super::{RelayError, RelaySink};
use crate::constants::RELAY_QUEUE_CAPACITY;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_websockets::{ClientBuilder, Message};
use tracing::{debug, info, warn};

enum Outgoing {
    Text(String),
    Close,
}

/// Persistent relay connection
pub struct WsRelayClient {
    url: String,
    tx: mpsc::Sender<Outgoing>,
    connected: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WsRelayClient {
    /// Connect to a `ws://host:port/path` URL
    pub async fn connect(url: &str) -> Result<Self, RelayError> {
        let uri: http::Uri = url
            .parse()
            .map_err(|e| RelayError::Connect(format!("invalid WebSocket URI '{}': {}", url, e)))?;
        let (stream, _response) = ClientBuilder::from_uri(uri)
            .connect()
            .await
            .map_err(|e| RelayError::Connect(e.to_string()))?;

        info!(url, "Relay connected");

        let (tx, mut rx) = mpsc::channel::<Outgoing>(RELAY_QUEUE_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));
        let task_connected = Arc::clone(&connected);
        let task_url = url.to_string();

        let task = tokio::spawn(async move {
            let (mut writer, mut reader) = stream.split();
            loop {
                tokio::select! {
                    outgoing = rx.recv() => match outgoing {
                        Some(Outgoing::Text(text)) => {
                            if let Err(e) = writer.send(Message::text(text)).await {
                                warn!(url = %task_url, error = %e, "Relay send failed, closing");
                                break;
                            }
                        }
                        Some(Outgoing::Close) | None => {
                            if let Err(e) = writer.close().await {
                                debug!(error = %e, "Relay close handshake failed");
                            }
                            break;
                        }
                    },
                    incoming = reader.next() => match incoming {
                        Some(Ok(msg)) => {
                            if msg.is_close() {
                                debug!(url = %task_url, "Relay closed by peer");
                                break;
                            }
                            // Viewers only listen; anything else is ignored
                        }
                        Some(Err(e)) => {
                            warn!(url = %task_url, error = %e, "Relay connection error");
                            break;
                        }
                        None => {
                            debug!(url = %task_url, "Relay stream ended");
                            break;
                        }
                    },
                }
            }
            task_connected.store(false, Ordering::SeqCst);
            info!(url = %task_url, "Relay disconnected");
        });

        Ok(Self {
            url: url.to_string(),
            tx,
            connected,
            task: Some(task),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a close frame and wait for the connection task to finish
    pub async fn close(mut self) {
        if self.tx.send(Outgoing::Close).await.is_err() {
            debug!("Relay task already finished");
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Relay task ended abnormally");
            }
        }
    }
}

impl RelaySink for WsRelayClient {
    fn send_text(&self, text: String) -> Result<(), RelayError> {
        if !self.is_connected() {
            return Err(RelayError::NotConnected);
        }
        self.tx.try_send(Outgoing::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RelayError::Send("queue full".into()),
            mpsc::error::TrySendError::Closed(_) => RelayError::Closed,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.tx.is_closed()
    }
}

impl Drop for WsRelayClient {
    fn drop(&mut self) {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            // Lets the task send its close frame and exit
            let _ = self.tx.try_send(Outgoing::Close);
        }
    }
}
