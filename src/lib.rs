#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # logtail_stream: resilient live log streaming
//!
//! This crate keeps a consumer attached to a server-pushed stream of text records over a
//! long-lived, unreliable connection. It survives drops transparently, switches channels
//! cleanly and bounds memory while preserving delivery order.
//!
//! ## Overview
//!
//! The client is composed from four pieces, leaves first:
//!
//! 1. **Backoff** - capped exponential delay between reconnect attempts (1s, 2s, 4s ... 30s)
//! 2. **Buffer** - bounded FIFO of the most recent records (500 by default)
//! 3. **State machine** - lifecycle of one connection (Idle, Connecting, Open, Closed,
//!    Reconnecting)
//! 4. **Client** - one active session at a time, driven on tokio
//!
//! ## Guarantees
//!
//! - **Liveness**: every failure is retried; there is no retry limit
//! - **Local ordering**: records are buffered in the order the active connection delivers them
//! - **Clean switches**: a new subscription finalizes the old one before any new state is visible
//! - **No stale effects**: events and timers from a finalized session are discarded
//!
//! Records are opaque. Gaps across a reconnect are possible and not hidden.
//!
//! ## Client Usage
//!
//! ```ignore
//! use logtail_stream::{ChannelStreamClient, StreamConfig};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ChannelStreamClient::websocket(StreamConfig::from_env())?;
//!     let mut entries = client.entries();
//!
//!     client.subscribe("alpha_early");
//!
//!     while let Some(entry) = entries.next().await {
//!         println!("{} {}", entry.seq, entry.text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Server Usage
//!
//! ```ignore
//! use logtail_stream::server::{router, LogHub};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Arc::new(LogHub::default());
//!     let app = router(Arc::clone(&hub));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[backoff]** - Reconnect delay policy
//! - **[buffer]** - Bounded log buffer and entries
//! - **[state]** - Connection state machine
//! - **[session]** - I/O-free session core
//! - **[client]** - Tokio driver and public client
//! - **[transport]** - Connector trait and WebSocket implementation
//! - **[protocol]** - Endpoint constants and URL construction
//! - **[server]** - Axum log streaming endpoint
//! - **[config]** - Client configuration
//! - **[error]** - Error types and result handling
//! - **[testing]** - Scriptable connector for tests

pub mod backoff;
pub mod buffer;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod state;
pub mod testing;
pub mod transport;
pub mod types;

pub use backoff::BackoffPolicy;
pub use buffer::{LogBuffer, LogEntry};
pub use client::ChannelStreamClient;
pub use config::StreamConfig;
pub use error::{Result, StreamError};
pub use state::{ConnectionState, ConnectionStateMachine, Transition};
pub use transport::{Connector, MessageStream, WebSocketConnector};
pub use types::{Channel, Source};

#[cfg(test)]
mod tests;
