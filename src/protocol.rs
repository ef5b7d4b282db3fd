//! Endpoint constants and URL construction for the log streaming endpoint.
//!
//! The server exposes one WebSocket endpoint per deployment. The channel to watch is
//! passed as a query parameter:
//!
//! | Part | Default | Example |
//! |------|---------|---------|
//! | Path | `/ws/logs` | `/ws/logs` |
//! | Channel parameter | `bot` | `?bot=alpha_early` |
//!
//! HTTP base URLs are mapped to their WebSocket counterparts (`http` → `ws`,
//! `https` → `wss`), so the same API base URL can be shared with the REST client.
//!
//! # Examples
//!
//! ```
//! use logtail_stream::{protocol, StreamConfig};
//!
//! let config = StreamConfig {
//!     base_url: "https://api.example.com".to_string(),
//!     ..Default::default()
//! };
//! let url = protocol::channel_url(&config, "alpha early").unwrap();
//! assert_eq!(url.as_str(), "wss://api.example.com/ws/logs?bot=alpha+early");
//! ```

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use url::Url;

/// Base URL used when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Path of the log streaming endpoint.
pub const LOGS_PATH: &str = "/ws/logs";

/// Query parameter naming the channel.
pub const CHANNEL_PARAM: &str = "bot";

/// Number of log entries retained by default.
pub const DEFAULT_BUFFER_CAPACITY: usize = 500;

/// Map an HTTP(S) or WS(S) scheme to the WebSocket scheme to dial.
pub fn websocket_scheme(scheme: &str) -> Result<&'static str> {
    match scheme {
        "http" | "ws" => Ok("ws"),
        "https" | "wss" => Ok("wss"),
        other => Err(StreamError::UnsupportedScheme(other.to_string())),
    }
}

/// Build the WebSocket URL for `channel`.
///
/// The path and query of the base URL are replaced; the channel is form-encoded.
pub fn channel_url(config: &StreamConfig, channel: &str) -> Result<Url> {
    let mut url = Url::parse(&config.base_url)?;
    let scheme = websocket_scheme(url.scheme())?;

    url.set_scheme(scheme)
        .map_err(|_| StreamError::UnsupportedScheme(url.scheme().to_string()))?;
    url.set_path(&config.path);
    url.set_fragment(None);
    url.query_pairs_mut()
        .clear()
        .append_pair(&config.channel_param, channel);

    Ok(url)
}
