//! Client configuration.
//!
//! [`StreamConfig`] carries everything the client needs to know about the remote
//! endpoint and its own resource bounds. It can be built in code, deserialized from
//! JSON, or read from the environment.
//!
//! # Examples
//!
//! ```
//! use logtail_stream::StreamConfig;
//!
//! let config = StreamConfig {
//!     base_url: "https://api.example.com".to_string(),
//!     buffer_capacity: 200,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use crate::backoff::BackoffPolicy;
use crate::error::{Result, StreamError};
use crate::protocol;
use serde::Deserialize;
use std::time::Duration;

/// Environment variable holding the API base URL.
pub const API_URL_ENV: &str = "LOGTAIL_API_URL";

/// Largest accepted `buffer_capacity` and `broadcast_capacity`.
pub const MAX_CAPACITY: usize = 1 << 20;

/// Configuration for [`ChannelStreamClient`](crate::ChannelStreamClient).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Base URL of the API (`http`, `https`, `ws` or `wss`)
    pub base_url: String,

    /// Path of the log streaming endpoint
    pub path: String,

    /// Query parameter carrying the channel identifier
    pub channel_param: String,

    /// Maximum number of entries retained in the log buffer
    pub buffer_capacity: usize,

    /// Delay before the first reconnect attempt, in milliseconds
    pub backoff_base_ms: u64,

    /// Upper bound for any reconnect delay, in milliseconds
    pub backoff_cap_ms: u64,

    /// How long a single connection attempt may take, in milliseconds
    pub connect_timeout_ms: u64,

    /// Capacity of the live entry broadcast channel
    pub broadcast_capacity: usize,

    /// Emit warn-level logs for dropped connections and reconnects
    pub enable_logging: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: protocol::DEFAULT_BASE_URL.to_string(),
            path: protocol::LOGS_PATH.to_string(),
            channel_param: protocol::CHANNEL_PARAM.to_string(),
            buffer_capacity: protocol::DEFAULT_BUFFER_CAPACITY,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 30_000,
            connect_timeout_ms: 10_000,
            broadcast_capacity: 1_024,
            enable_logging: true,
        }
    }
}

impl StreamConfig {
    /// Defaults, with `base_url` taken from `LOGTAIL_API_URL` when it is set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url.trim().to_string();
            }
        }
        config
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| StreamError::Config(e.to_string()))
    }

    /// Check that the configuration can produce endpoint URLs and sane timings.
    pub fn validate(&self) -> Result<()> {
        protocol::channel_url(self, "channel")?;

        if self.backoff_base_ms == 0 {
            return Err(StreamError::Config("backoff_base_ms must be positive".into()));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(StreamError::Config(
                "backoff_cap_ms must not be below backoff_base_ms".into(),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(StreamError::Config("connect_timeout_ms must be positive".into()));
        }
        if self.broadcast_capacity == 0 {
            return Err(StreamError::Config("broadcast_capacity must be positive".into()));
        }
        if self.broadcast_capacity > MAX_CAPACITY {
            return Err(StreamError::Config(format!(
                "broadcast_capacity must not exceed {}",
                MAX_CAPACITY
            )));
        }
        if self.buffer_capacity > MAX_CAPACITY {
            return Err(StreamError::Config(format!(
                "buffer_capacity must not exceed {}",
                MAX_CAPACITY
            )));
        }
        Ok(())
    }

    /// Backoff policy described by this configuration.
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_cap_ms),
        )
    }

    /// Connection attempt timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
