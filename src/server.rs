//! Log streaming endpoint for Axum.
//!
//! [`LogHub`] keeps one broadcast channel per log channel. [`router`] exposes it as
//! `GET /ws/logs?bot=<channel>`: the request is upgraded to a WebSocket and every line
//! published to that channel afterwards is forwarded as a text frame.
//!
//! # Usage
//!
//! ```ignore
//! use logtail_stream::server::{router, LogHub};
//! use std::sync::Arc;
//!
//! let hub = Arc::new(LogHub::new(256));
//! let app = router(Arc::clone(&hub));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! tokio::spawn(async move { axum::serve(listener, app).await });
//!
//! hub.publish("alpha_early", "signal fired");
//! ```
//!
//! Clients that fall behind by more than the hub capacity skip the missed lines.
//! [`LogHub::close_channel`] disconnects every client of a channel. A channel is
//! forgotten once its last WebSocket client goes away.

use crate::protocol;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Per-channel fan-out of log lines.
pub struct LogHub {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl LogHub {
    /// Create a hub buffering up to `capacity` lines per channel for slow clients.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish a line, returning how many clients will receive it.
    pub fn publish(&self, channel: &str, line: impl Into<String>) -> usize {
        let channels = self.channels.read();
        match channels.get(channel) {
            Some(tx) => tx.send(line.into()).unwrap_or(0),
            None => 0,
        }
    }

    /// Receive every line published to `channel` from now on.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        if let Some(tx) = self.channels.read().get(channel) {
            return tx.subscribe();
        }

        let mut channels = self.channels.write();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Disconnect every client of `channel`. Returns whether the channel existed.
    pub fn close_channel(&self, channel: &str) -> bool {
        self.channels.write().remove(channel).is_some()
    }

    /// Forget `channel` if nobody receives it any more. Returns whether it was removed.
    pub fn release(&self, channel: &str) -> bool {
        let mut channels = self.channels.write();
        match channels.get(channel) {
            Some(tx) if tx.receiver_count() == 0 => {
                channels.remove(channel);
                true
            }
            _ => false,
        }
    }

    /// Number of clients currently receiving `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Channels with a live broadcast sender.
    pub fn channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(1_024)
    }
}

/// Router serving [`protocol::LOGS_PATH`] from `hub`.
pub fn router(hub: Arc<LogHub>) -> Router {
    Router::new()
        .route(protocol::LOGS_PATH, get(ws_logs))
        .with_state(hub)
}

async fn ws_logs(
    ws: WebSocketUpgrade,
    Query(params): Query<HashMap<String, String>>,
    State(hub): State<Arc<LogHub>>,
) -> Response {
    let Some(channel) = params.get(protocol::CHANNEL_PARAM).cloned() else {
        return (StatusCode::BAD_REQUEST, "missing channel parameter").into_response();
    };

    // subscribe before the handshake completes so nothing published after the
    // client sees the connection open can be missed
    let listener = Listener::new(hub, channel);
    ws.on_upgrade(move |socket| forward(socket, listener))
}

/// One WebSocket client's receiver. Dropping it releases the channel when it was the
/// last one, including when the upgrade never completes.
struct Listener {
    hub: Arc<LogHub>,
    channel: String,
    rx: Option<broadcast::Receiver<String>>,
}

impl Listener {
    fn new(hub: Arc<LogHub>, channel: String) -> Self {
        let rx = hub.subscribe(&channel);
        Self {
            hub,
            channel,
            rx: Some(rx),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.rx = None;
        if self.hub.release(&self.channel) {
            debug!(channel = %self.channel, "Channel released");
        }
    }
}

async fn forward(mut socket: WebSocket, mut listener: Listener) {
    let channel = listener.channel.clone();
    let Some(rx) = listener.rx.as_mut() else {
        return;
    };
    debug!(channel = %channel, "Log client connected");

    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Ok(line) => {
                    if socket.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "Log client lagging");
                }
                Err(RecvError::Closed) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(channel = %channel, "Log client disconnected");
}
