//! Connection lifecycle state machine.
//!
//! Tracks one underlying connection through its lifecycle:
//!
//! ```text
//!            Subscribe            Opened
//!   Idle ─────────────► Connecting ──────► Open
//!    ▲                    │   ▲              │
//!    │            Closed  │   │ TimerFired   │ Closed
//!    │                    ▼   │              │
//!    │                  Closed ◄─────────────┘
//!    │                    │
//!    │     RetryScheduled ▼
//!    │               Reconnecting
//!    │
//!    └──────── Teardown (from any state)
//! ```
//!
//! Clean and error closes are the same `Closed` transition. Anything outside the table
//! is rejected with [`StreamError::InvalidTransition`] and leaves the state untouched.

use crate::error::{Result, StreamError};
use serde::Serialize;
use std::fmt;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No session, or the session was torn down
    Idle,
    /// A connection attempt is in flight
    Connecting,
    /// The connection is established and delivering records
    Open,
    /// The connection just dropped
    Closed,
    /// Waiting for the backoff timer before the next attempt
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Events that move the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A session starts a connection
    Subscribe,
    /// The connection reported success
    Opened,
    /// The connection failed, errored or closed
    Closed,
    /// A backoff timer was armed
    RetryScheduled,
    /// The backoff timer fired
    TimerFired,
    /// The session is being finalized
    Teardown,
}

/// State machine for a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    /// A machine in [`ConnectionState::Idle`].
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// State reached by applying `transition` to `from`, if the table allows it.
    pub fn next_state(from: ConnectionState, transition: Transition) -> Option<ConnectionState> {
        use ConnectionState::*;

        match (from, transition) {
            (_, Transition::Teardown) => Some(Idle),
            (Idle, Transition::Subscribe) => Some(Connecting),
            (Connecting, Transition::Opened) => Some(Open),
            (Connecting | Open, Transition::Closed) => Some(Closed),
            (Closed, Transition::RetryScheduled) => Some(Reconnecting),
            (Reconnecting, Transition::TimerFired) => Some(Connecting),
            _ => None,
        }
    }

    /// Apply a transition, returning the new state.
    pub fn apply(&mut self, transition: Transition) -> Result<ConnectionState> {
        match Self::next_state(self.state, transition) {
            Some(next) => {
                self.state = next;
                Ok(next)
            }
            None => Err(StreamError::InvalidTransition {
                from: self.state,
                transition,
            }),
        }
    }

    /// Whether the machine is waiting on an established or pending connection.
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        )
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
