//! Transport seam between the client and the network.
//!
//! A [`Connector`] opens one persistent text connection for a channel and hands back
//! its inbound records as a [`MessageStream`]. The client only cares about four
//! things: the connect future resolving (open), stream items (message), an `Err` item
//! (error) and the end of the stream (close).
//!
//! [`WebSocketConnector`] is the production implementation. Text frames become
//! records, binary frames are decoded as lossy UTF-8, control frames are skipped and
//! a close frame ends the stream.

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::protocol;
use crate::types::Channel;
use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Inbound records of one connection.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Opens connections for channels.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a connection for `channel`.
    ///
    /// Resolving to `Ok` means the connection is open. Dropping the returned stream
    /// must close the connection.
    async fn connect(&self, channel: &Channel) -> Result<MessageStream>;
}

/// [`Connector`] over WebSockets.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: StreamConfig,
}

impl WebSocketConnector {
    /// Create a connector dialing the endpoint described by `config`.
    pub fn new(config: StreamConfig) -> Self {
        Self { config }
    }
}

/// What a single WebSocket frame means for the record stream.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Record(String),
    Control,
    Close,
}

fn classify(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Record(text.as_str().to_owned()),
        Message::Binary(data) => Frame::Record(String::from_utf8_lossy(&data).into_owned()),
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Frame::Control,
        Message::Close(_) => Frame::Close,
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, channel: &Channel) -> Result<MessageStream> {
        let url = protocol::channel_url(&self.config, channel.as_str())?;
        debug!(url = %url, "Opening WebSocket");

        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect(e.to_string()))?;

        // an error item is the last item of the stream
        let records = stream::unfold(Some(ws), |ws| async move {
            let mut ws = ws?;
            loop {
                match ws.next().await? {
                    Ok(message) => match classify(message) {
                        Frame::Record(text) => return Some((Ok(text), Some(ws))),
                        Frame::Control => continue,
                        Frame::Close => return None,
                    },
                    Err(e) => return Some((Err(StreamError::from(e)), None)),
                }
            }
        });

        Ok(Box::pin(records))
    }
}
