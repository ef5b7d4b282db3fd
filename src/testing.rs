//! Test utilities: a scriptable [`Connector`].
//!
//! [`MockConnector`] parks every connection attempt until the test decides its fate
//! through the paired [`MockHandle`]:
//!
//! ```ignore
//! let (connector, mut handle) = MockConnector::new();
//! let client = ChannelStreamClient::new(connector, StreamConfig::default())?;
//! client.subscribe("x");
//!
//! let link = handle.next_attempt().await.unwrap().accept();
//! link.send("hello");
//! link.close();
//! ```

use crate::error::{Result, StreamError};
use crate::transport::{Connector, MessageStream};
use crate::types::Channel;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

type Decision = Result<mpsc::UnboundedReceiver<Result<String>>>;

/// Connector whose attempts are resolved by a [`MockHandle`].
pub struct MockConnector {
    attempts_tx: mpsc::UnboundedSender<PendingAttempt>,
    history: Arc<Mutex<Vec<Channel>>>,
}

/// Test-side control of a [`MockConnector`].
pub struct MockHandle {
    attempts_rx: mpsc::UnboundedReceiver<PendingAttempt>,
    history: Arc<Mutex<Vec<Channel>>>,
}

impl MockConnector {
    /// Create a connector and its handle.
    pub fn new() -> (Self, MockHandle) {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        let history = Arc::new(Mutex::new(Vec::new()));

        (
            Self {
                attempts_tx,
                history: Arc::clone(&history),
            },
            MockHandle {
                attempts_rx,
                history,
            },
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, channel: &Channel) -> Result<MessageStream> {
        self.history.lock().push(channel.clone());

        let (decision_tx, decision_rx) = oneshot::channel::<Decision>();
        self.attempts_tx
            .send(PendingAttempt {
                channel: channel.clone(),
                decision: decision_tx,
            })
            .map_err(|_| StreamError::Connect("mock handle dropped".into()))?;

        match decision_rx.await {
            Ok(Ok(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(StreamError::Connect("attempt abandoned".into())),
        }
    }
}

impl MockHandle {
    /// Wait for the next connection attempt.
    pub async fn next_attempt(&mut self) -> Option<PendingAttempt> {
        self.attempts_rx.recv().await
    }

    /// The next connection attempt, if one is already waiting.
    pub fn try_next_attempt(&mut self) -> Option<PendingAttempt> {
        self.attempts_rx.try_recv().ok()
    }

    /// Channels of every attempt made so far, in order.
    pub fn history(&self) -> Vec<Channel> {
        self.history.lock().clone()
    }
}

/// A connection attempt waiting for the test to accept or refuse it.
#[derive(Debug)]
pub struct PendingAttempt {
    channel: Channel,
    decision: oneshot::Sender<Decision>,
}

impl PendingAttempt {
    /// Channel the client is connecting to.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Let the connection open.
    ///
    /// If the client already gave up on this attempt, the returned link is closed.
    pub fn accept(self) -> MockLink {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.decision.send(Ok(rx));
        MockLink {
            channel: self.channel,
            tx,
        }
    }

    /// Fail the connection attempt.
    pub fn refuse(self) {
        let _ = self
            .decision
            .send(Err(StreamError::Connect("connection refused".into())));
    }
}

/// Server side of an accepted mock connection.
pub struct MockLink {
    channel: Channel,
    tx: mpsc::UnboundedSender<Result<String>>,
}

impl MockLink {
    /// Channel this link serves.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Push a record. Returns `false` if the client dropped the connection.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.tx.send(Ok(text.into())).is_ok()
    }

    /// Fail the connection with a transport error.
    pub fn fail(self, reason: &str) {
        let _ = self.tx.send(Err(StreamError::Transport(reason.to_string())));
    }

    /// Close the connection cleanly.
    pub fn close(self) {
        drop(self.tx);
    }

    /// Whether the client dropped the connection.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the client drops the connection.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
