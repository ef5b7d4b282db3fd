//! Resilient channel stream client.
//!
//! [`ChannelStreamClient`] keeps one logical subscription alive over an unreliable
//! connection. It owns a [`StreamCore`] and carries out the core's actions on the tokio
//! runtime:
//!
//! - every connection attempt runs as its own task, reporting open/message/error/close
//!   back to the core tagged with its [`ConnectionId`]
//! - every backoff timer is a task sleeping for the computed delay
//! - dropping a connection or cancelling a timer aborts its task
//!
//! The core sits behind a `parking_lot` mutex that is never held across an `.await`,
//! so every event is applied atomically and in the order each connection delivers it.
//! Events that slip through between an abort and the task actually stopping are
//! rejected by the core's identity check.
//!
//! # Examples
//!
//! ```no_run
//! use logtail_stream::{ChannelStreamClient, ConnectionState, StreamConfig};
//! use futures::StreamExt;
//!
//! # async fn run() -> logtail_stream::Result<()> {
//! let client = ChannelStreamClient::websocket(StreamConfig::from_env())?;
//! let mut entries = client.entries();
//! client.subscribe("alpha_early");
//!
//! while let Some(entry) = entries.next().await {
//!     println!("[{}] {}", client.current_state(), entry.text);
//! }
//! # Ok(())
//! # }
//! ```

use crate::buffer::LogEntry;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::session::{Action, ConnectionId, StreamCore, TimerId, TransportEvent};
use crate::state::ConnectionState;
use crate::transport::{Connector, WebSocketConnector};
use crate::types::{Channel, Source};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

/// Client maintaining a single live subscription to a log channel.
///
/// Dropping the client tears the session down.
pub struct ChannelStreamClient {
    inner: Arc<Inner>,
}

struct Inner {
    driver: Mutex<Driver>,
    connector: Arc<dyn Connector>,
    config: StreamConfig,
    state_tx: watch::Sender<ConnectionState>,
    entries_tx: broadcast::Sender<LogEntry>,
}

struct Driver {
    core: StreamCore,
    connections: HashMap<ConnectionId, JoinHandle<()>>,
    timers: HashMap<TimerId, JoinHandle<()>>,
}

impl ChannelStreamClient {
    /// Create a client using `connector` for its connections.
    ///
    /// Fails if `config` does not validate.
    pub fn new(connector: impl Connector, config: StreamConfig) -> Result<Self> {
        Self::with_connector(Arc::new(connector), config)
    }

    /// Create a client over an already shared connector.
    pub fn with_connector(connector: Arc<dyn Connector>, config: StreamConfig) -> Result<Self> {
        config.validate()?;

        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (entries_tx, _) = broadcast::channel(config.broadcast_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                driver: Mutex::new(Driver {
                    core: StreamCore::new(&config),
                    connections: HashMap::new(),
                    timers: HashMap::new(),
                }),
                connector,
                config,
                state_tx,
                entries_tx,
            }),
        })
    }

    /// Create a client connecting over WebSockets.
    pub fn websocket(config: StreamConfig) -> Result<Self> {
        Self::new(WebSocketConnector::new(config.clone()), config)
    }

    /// Switch to `channel`.
    ///
    /// The current session is finalized first: its timers are cancelled, its
    /// connections closed and its buffer discarded. Must be called inside a tokio
    /// runtime.
    pub fn subscribe(&self, channel: impl Into<Channel>) {
        self.subscribe_merged([Source::new(channel)]);
    }

    /// Switch to a session fed by several channels at once.
    ///
    /// Each source keeps its own connection and retry schedule; all of them append to
    /// the same buffer. Must be called inside a tokio runtime.
    pub fn subscribe_merged(&self, sources: impl IntoIterator<Item = Source>) {
        let sources: Vec<Source> = sources.into_iter().collect();
        info!(
            channels = ?sources.iter().map(|s| s.channel.as_str()).collect::<Vec<_>>(),
            "Subscribing"
        );
        self.inner.apply(move |driver| driver.core.subscribe(sources));
    }

    /// Finalize the current session. The client is idle with an empty buffer afterwards.
    pub fn unsubscribe(&self) {
        self.inner.apply(|driver| driver.core.teardown());
    }

    /// Empty the buffer without touching the connection.
    pub fn clear_logs(&self) {
        self.inner.driver.lock().core.clear_logs();
    }

    /// Aggregate connection state of the current session.
    pub fn current_state(&self) -> ConnectionState {
        self.inner.driver.lock().core.state()
    }

    /// Ordered copy of the buffered entries, oldest first.
    pub fn current_buffer(&self) -> Vec<LogEntry> {
        self.inner.driver.lock().core.snapshot()
    }

    /// Channels of the current session; empty when idle.
    pub fn channels(&self) -> Vec<Channel> {
        self.inner
            .driver
            .lock()
            .core
            .session()
            .map(|s| s.channels())
            .unwrap_or_default()
    }

    /// Receiver observing every change of [`current_state`](Self::current_state).
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Live stream of entries as they are buffered.
    ///
    /// Only entries appended after this call are yielded. A consumer that falls more
    /// than `broadcast_capacity` entries behind skips the oldest ones.
    pub fn entries(&self) -> impl Stream<Item = LogEntry> + Send + Unpin + 'static {
        BroadcastStream::new(self.inner.entries_tx.subscribe()).filter_map(|item| {
            let entry = match item {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(error = %e, "Entry stream lagged");
                    None
                }
            };
            futures::future::ready(entry)
        })
    }

    /// Client configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    #[cfg(test)]
    pub(crate) fn running_tasks(&self) -> usize {
        let driver = self.inner.driver.lock();
        driver
            .connections
            .values()
            .chain(driver.timers.values())
            .filter(|h| !h.is_finished())
            .count()
    }
}

impl Drop for ChannelStreamClient {
    fn drop(&mut self) {
        self.inner.apply(|driver| driver.core.teardown());
    }
}

impl Inner {
    /// Run `f` against the driver, carry out the resulting actions and publish the
    /// new state.
    fn apply<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(&mut Driver) -> Vec<Action>,
    {
        let mut driver = self.driver.lock();
        let actions = f(&mut *driver);
        self.dispatch(&mut *driver, actions);

        let state = driver.core.state();
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn dispatch(self: &Arc<Self>, driver: &mut Driver, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Connect {
                    connection,
                    channel,
                } => {
                    let task = tokio::spawn(run_connection(Arc::clone(self), connection, channel));
                    driver.connections.insert(connection, task);
                }
                Action::Disconnect { connection } => {
                    if let Some(task) = driver.connections.remove(&connection) {
                        task.abort();
                    }
                }
                Action::ScheduleRetry { timer, delay } => {
                    let inner = Arc::clone(self);
                    let task = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        inner.apply(|driver| {
                            driver.timers.remove(&timer);
                            driver.core.handle_timer(timer)
                        });
                    });
                    driver.timers.insert(timer, task);
                }
                Action::CancelRetry { timer } => {
                    if let Some(task) = driver.timers.remove(&timer) {
                        task.abort();
                    }
                }
                Action::Deliver(entry) => {
                    // no live consumers is fine; the entry is already buffered
                    let _ = self.entries_tx.send(entry);
                }
            }
        }
    }

    fn report(self: &Arc<Self>, connection: ConnectionId, event: TransportEvent) {
        self.apply(|driver| driver.core.handle_event(connection, event));
    }
}

/// Drive one connection attempt until it fails or closes.
async fn run_connection(inner: Arc<Inner>, connection: ConnectionId, channel: Channel) {
    let attempt = tokio::time::timeout(
        inner.config.connect_timeout(),
        inner.connector.connect(&channel),
    )
    .await
    .map_err(|_| StreamError::ConnectTimeout)
    .and_then(|result| result);

    let mut stream = match attempt {
        Ok(stream) => stream,
        Err(e) => {
            if e.is_transient() {
                debug!(
                    channel = %channel,
                    connection = %connection,
                    error = %e,
                    "Connection attempt failed"
                );
            } else {
                warn!(
                    channel = %channel,
                    connection = %connection,
                    error = %e,
                    "Connector rejected channel"
                );
            }
            inner.report(connection, TransportEvent::Error(e.to_string()));
            return;
        }
    };

    inner.report(connection, TransportEvent::Opened);

    while let Some(item) = stream.next().await {
        match item {
            Ok(text) => inner.report(connection, TransportEvent::Message(text)),
            Err(e) => {
                inner.report(connection, TransportEvent::Error(e.to_string()));
                return;
            }
        }
    }

    inner.report(connection, TransportEvent::Closed);
}
