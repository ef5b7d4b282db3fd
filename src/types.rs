//! Channel identifiers and session sources.

use serde::Serialize;
use std::fmt;

/// Opaque identifier of a remote log channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Channel(String);

impl Channel {
    /// Create a channel identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Channel(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Channel {
    fn from(id: &str) -> Self {
        Channel::new(id)
    }
}

impl From<String> for Channel {
    fn from(id: String) -> Self {
        Channel(id)
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One underlying connection of a session.
///
/// A labelled source prefixes each of its records with `"<label>: "`, which keeps the
/// origin visible when several channels feed the same buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Channel to connect to
    pub channel: Channel,
    /// Optional record prefix
    pub label: Option<String>,
}

impl Source {
    /// An unlabelled source.
    pub fn new(channel: impl Into<Channel>) -> Self {
        Self {
            channel: channel.into(),
            label: None,
        }
    }

    /// A source whose records are prefixed with `label`.
    pub fn labelled(channel: impl Into<Channel>, label: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            label: Some(label.into()),
        }
    }

    /// Text stored in the buffer for a record received from this source.
    pub fn format_record(&self, text: &str) -> String {
        match &self.label {
            Some(label) => format!("{}: {}", label, text),
            None => text.to_string(),
        }
    }
}

impl From<Channel> for Source {
    fn from(channel: Channel) -> Self {
        Source::new(channel)
    }
}

impl From<&str> for Source {
    fn from(channel: &str) -> Self {
        Source::new(channel)
    }
}
