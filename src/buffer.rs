//! Bounded, order-preserving log buffer.
//!
//! Holds the most recent `capacity` entries in arrival order. Appending to a full
//! buffer evicts the oldest entry first, so memory stays bounded no matter how long a
//! session runs.

use serde::Serialize;
use std::collections::VecDeque;

/// A single streamed record.
///
/// `seq` is the arrival sequence number within one session; it starts at 1 and is
/// never reused, even after [`LogBuffer::clear`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    /// Arrival sequence number within the session
    pub seq: u64,
    /// Record text, prefixed with the source label for merged sessions
    pub text: String,
}

impl LogEntry {
    /// Create an entry.
    pub fn new(seq: u64, text: impl Into<String>) -> Self {
        Self {
            seq,
            text: text.into(),
        }
    }
}

/// FIFO-evicting buffer of [`LogEntry`] values.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    /// Create an empty buffer retaining at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest one if the buffer is full.
    pub fn append(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Ordered copy of the retained entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate over retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(crate::protocol::DEFAULT_BUFFER_CAPACITY)
    }
}
