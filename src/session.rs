//! Session core: the I/O-free heart of the stream client.
//!
//! [`StreamCore`] owns the active [`StreamSession`] and is driven by three kinds of
//! input:
//!
//! - consumer commands (`subscribe`, `teardown`, `clear_logs`)
//! - transport events tagged with the [`ConnectionId`] that produced them
//! - timer expiries tagged with the [`TimerId`] that was armed
//!
//! Every input returns the list of [`Action`]s the driver has to carry out (open a
//! connection, drop one, arm or cancel a timer, publish an entry). The core never
//! touches sockets or clocks, so the whole retry and cancellation contract can be
//! exercised synchronously.
//!
//! # Staleness
//!
//! Connection and timer identities are minted from a single counter per core and are
//! never reused. An event is only applied if its identity is the one currently recorded
//! for a source of the active session; anything else belongs to a torn-down session or
//! a superseded attempt and is dropped.
//!
//! # Examples
//!
//! ```
//! use logtail_stream::session::{Action, StreamCore, TransportEvent};
//! use logtail_stream::{ConnectionState, Source, StreamConfig};
//!
//! let mut core = StreamCore::new(&StreamConfig::default());
//! let actions = core.subscribe(vec![Source::new("x")]);
//! let connection = match &actions[0] {
//!     Action::Connect { connection, .. } => *connection,
//!     _ => unreachable!(),
//! };
//!
//! core.handle_event(connection, TransportEvent::Opened);
//! core.handle_event(connection, TransportEvent::Message("hello".into()));
//! assert_eq!(core.state(), ConnectionState::Open);
//! assert_eq!(core.snapshot()[0].text, "hello");
//! ```

use crate::backoff::BackoffPolicy;
use crate::buffer::{LogBuffer, LogEntry};
use crate::config::StreamConfig;
use crate::state::{ConnectionState, ConnectionStateMachine, Transition};
use crate::types::{Channel, Source};
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Identity of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

/// Identity of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

/// Identity of one armed backoff timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// What a connection reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established
    Opened,
    /// A text record arrived
    Message(String),
    /// The connection failed
    Error(String),
    /// The connection ended
    Closed,
}

/// Work the driver must perform on behalf of the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open a connection to `channel`, tagging its events with `connection`
    Connect {
        /// Identity for events of this attempt
        connection: ConnectionId,
        /// Channel to connect to
        channel: Channel,
    },
    /// Close the connection and stop delivering its events
    Disconnect {
        /// Connection to drop
        connection: ConnectionId,
    },
    /// Arm a timer; report it back through [`StreamCore::handle_timer`]
    ScheduleRetry {
        /// Identity of the timer
        timer: TimerId,
        /// Time until it fires
        delay: Duration,
    },
    /// Disarm a timer
    CancelRetry {
        /// Timer to disarm
        timer: TimerId,
    },
    /// Publish a freshly buffered entry to live consumers
    Deliver(LogEntry),
}

/// Reconnect bookkeeping for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Consecutive failed attempts since the last successful open
    pub attempt: u32,
    /// Timer armed for the next attempt, if any
    pub pending_timer: Option<TimerId>,
}

#[derive(Debug)]
struct Link {
    source: Source,
    machine: ConnectionStateMachine,
    retry: RetryState,
    connection: Option<ConnectionId>,
}

impl Link {
    fn apply(&mut self, transition: Transition) -> bool {
        match self.machine.apply(transition) {
            Ok(_) => true,
            Err(e) => {
                debug!(channel = %self.source.channel, error = %e, "Ignoring event");
                false
            }
        }
    }
}

/// The live binding of sources to their connections, state and buffer.
#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    links: Vec<Link>,
    buffer: LogBuffer,
    next_seq: u64,
}

impl StreamSession {
    /// Session identity.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Channels this session is bound to.
    pub fn channels(&self) -> Vec<Channel> {
        self.links.iter().map(|l| l.source.channel.clone()).collect()
    }

    /// Aggregate state over every source.
    pub fn state(&self) -> ConnectionState {
        if self.links.is_empty() {
            return ConnectionState::Idle;
        }
        // a source that is neither connecting nor open is waiting out a backoff
        if self.links.iter().any(|l| !l.machine.is_live()) {
            return ConnectionState::Reconnecting;
        }
        if self
            .links
            .iter()
            .all(|l| l.machine.state() == ConnectionState::Open)
        {
            ConnectionState::Open
        } else {
            ConnectionState::Connecting
        }
    }

    /// State of the source connected to `channel`.
    pub fn source_state(&self, channel: &str) -> Option<ConnectionState> {
        self.link(channel).map(|l| l.machine.state())
    }

    /// Retry bookkeeping of the source connected to `channel`.
    pub fn retry_state(&self, channel: &str) -> Option<&RetryState> {
        self.link(channel).map(|l| &l.retry)
    }

    /// Session buffer.
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    fn link(&self, channel: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.source.channel.as_str() == channel)
    }
}

/// Owner of the active session and of the identity counter.
#[derive(Debug)]
pub struct StreamCore {
    backoff: BackoffPolicy,
    buffer_capacity: usize,
    log_reconnects: bool,
    next_token: u64,
    session: Option<StreamSession>,
}

fn mint(counter: &mut u64) -> u64 {
    *counter += 1;
    *counter
}

impl StreamCore {
    /// Create an idle core.
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            backoff: config.backoff(),
            buffer_capacity: config.buffer_capacity,
            log_reconnects: config.enable_logging,
            next_token: 0,
            session: None,
        }
    }

    /// Finalize the current session and start a new one over `sources`.
    ///
    /// The previous session's timers are cancelled, its connections dropped and its
    /// buffer discarded before the new session exists. An empty `sources` list only
    /// tears down.
    pub fn subscribe(&mut self, sources: Vec<Source>) -> Vec<Action> {
        let mut actions = self.teardown();
        if sources.is_empty() {
            return actions;
        }

        let id = SessionId(mint(&mut self.next_token));
        let mut links = Vec::with_capacity(sources.len());

        for source in sources {
            let connection = ConnectionId(mint(&mut self.next_token));
            let mut link = Link {
                source,
                machine: ConnectionStateMachine::new(),
                retry: RetryState::default(),
                connection: Some(connection),
            };
            link.apply(Transition::Subscribe);

            debug!(
                session = %id,
                channel = %link.source.channel,
                connection = %connection,
                "Connecting"
            );
            actions.push(Action::Connect {
                connection,
                channel: link.source.channel.clone(),
            });
            links.push(link);
        }

        self.session = Some(StreamSession {
            id,
            links,
            buffer: LogBuffer::new(self.buffer_capacity),
            next_seq: 0,
        });

        actions
    }

    /// Finalize the current session, if any. The core is idle afterwards.
    pub fn teardown(&mut self) -> Vec<Action> {
        let Some(mut session) = self.session.take() else {
            return Vec::new();
        };

        let mut actions = Vec::new();
        for link in &mut session.links {
            if let Some(timer) = link.retry.pending_timer.take() {
                actions.push(Action::CancelRetry { timer });
            }
            if let Some(connection) = link.connection.take() {
                actions.push(Action::Disconnect { connection });
            }
            link.apply(Transition::Teardown);
        }
        session.buffer.clear();

        debug!(session = %session.id, "Session torn down");
        actions
    }

    /// Apply an event reported by `connection`.
    pub fn handle_event(&mut self, connection: ConnectionId, event: TransportEvent) -> Vec<Action> {
        let backoff = self.backoff;
        let log_reconnects = self.log_reconnects;
        let counter = &mut self.next_token;

        let Some(session) = self.session.as_mut() else {
            trace!(connection = %connection, "Dropping event, no active session");
            return Vec::new();
        };
        let Some(link) = session
            .links
            .iter_mut()
            .find(|l| l.connection == Some(connection))
        else {
            trace!(connection = %connection, "Dropping stale event");
            return Vec::new();
        };

        let mut actions = Vec::new();
        match event {
            TransportEvent::Opened => {
                if link.apply(Transition::Opened) {
                    link.retry.attempt = 0;
                    if let Some(timer) = link.retry.pending_timer.take() {
                        actions.push(Action::CancelRetry { timer });
                    }
                    debug!(
                        channel = %link.source.channel,
                        connection = %connection,
                        "Connection open"
                    );
                }
            }
            TransportEvent::Message(text) => {
                if link.machine.state() != ConnectionState::Open {
                    debug!(channel = %link.source.channel, "Dropping record received before open");
                    return actions;
                }
                session.next_seq += 1;
                let entry = LogEntry::new(session.next_seq, link.source.format_record(&text));
                session.buffer.append(entry.clone());
                actions.push(Action::Deliver(entry));
            }
            TransportEvent::Error(_) | TransportEvent::Closed => {
                if !link.apply(Transition::Closed) {
                    return actions;
                }
                link.connection = None;
                actions.push(Action::Disconnect { connection });

                link.retry.attempt = link.retry.attempt.saturating_add(1);
                let delay = backoff.delay(link.retry.attempt);
                let timer = TimerId(mint(counter));
                link.apply(Transition::RetryScheduled);
                link.retry.pending_timer = Some(timer);

                if log_reconnects {
                    let reason = match &event {
                        TransportEvent::Error(reason) => reason.as_str(),
                        _ => "closed",
                    };
                    warn!(
                        channel = %link.source.channel,
                        attempt = link.retry.attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason,
                        "Connection lost, reconnecting"
                    );
                }
                actions.push(Action::ScheduleRetry { timer, delay });
            }
        }
        actions
    }

    /// Apply the expiry of `timer`.
    pub fn handle_timer(&mut self, timer: TimerId) -> Vec<Action> {
        let counter = &mut self.next_token;

        let Some(session) = self.session.as_mut() else {
            trace!(timer = %timer, "Dropping timer, no active session");
            return Vec::new();
        };
        let Some(link) = session
            .links
            .iter_mut()
            .find(|l| l.retry.pending_timer == Some(timer))
        else {
            trace!(timer = %timer, "Dropping stale timer");
            return Vec::new();
        };

        link.retry.pending_timer = None;
        if !link.apply(Transition::TimerFired) {
            return Vec::new();
        }

        let connection = ConnectionId(mint(counter));
        link.connection = Some(connection);
        debug!(
            channel = %link.source.channel,
            connection = %connection,
            attempt = link.retry.attempt,
            "Reconnecting"
        );

        vec![Action::Connect {
            connection,
            channel: link.source.channel.clone(),
        }]
    }

    /// Empty the buffer of the active session, leaving its connections alone.
    pub fn clear_logs(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.buffer.clear();
        }
    }

    /// Aggregate state; [`ConnectionState::Idle`] without a session.
    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Idle, StreamSession::state)
    }

    /// Ordered copy of the active session's buffer; empty without a session.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.session
            .as_ref()
            .map(|s| s.buffer.snapshot())
            .unwrap_or_default()
    }

    /// The active session.
    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }
}
