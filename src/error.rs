//! Error types for the log stream client.
//!
//! Connection failures never reach the consumer as hard errors: they are logged and
//! fed into the reconnect path. The errors a caller can actually observe are
//! configuration errors raised while building a client or an endpoint URL.

use crate::state::{ConnectionState, Transition};
use thiserror::Error;

/// Result type alias for log stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors produced by the log stream client.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The configured base URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The base URL uses a scheme that cannot be mapped to a WebSocket scheme
    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// Establishing the underlying connection failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The connection failed after it was established
    #[error("Transport error: {0}")]
    Transport(String),

    /// The connection attempt did not complete in time
    #[error("Connection attempt timed out")]
    ConnectTimeout,

    /// A state machine transition outside the transition table
    #[error("Invalid transition {transition:?} from state {from:?}")]
    InvalidTransition {
        /// State the machine was in
        from: ConnectionState,
        /// Transition that was rejected
        transition: Transition,
    },

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl StreamError {
    /// Whether this error comes from the network and is recovered by reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StreamError::Connect(_) | StreamError::Transport(_) | StreamError::ConnectTimeout
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StreamError::Connect("refused".into()).is_transient());
        assert!(StreamError::ConnectTimeout.is_transient());
        assert!(!StreamError::Config("bad".into()).is_transient());
        assert!(!StreamError::UnsupportedScheme("ftp".into()).is_transient());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = StreamError::InvalidTransition {
            from: ConnectionState::Idle,
            transition: Transition::Opened,
        };
        assert_eq!(err.to_string(), "Invalid transition Opened from state Idle");
    }
}
