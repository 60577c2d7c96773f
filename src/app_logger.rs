//! Diagnostic log ring buffer.
//!
//! Stores structured log entries (level, source, message) in a fixed-capacity
//! bounded buffer. Every failure the panel manager or the supervisor swallows
//! ends up here and in `tracing`, so hosts and tests can inspect what went
//! wrong without anything being propagated to callers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single log entry stored in the ring buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp_ms: i64,
    pub level: LogLevel,
    pub source: String,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Ring buffer
// ---------------------------------------------------------------------------

pub(crate) const LOG_RING_CAPACITY: usize = 1000;

/// Bounded history of entries; the oldest entry is evicted once full.
pub(crate) struct LogRingBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl LogRingBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    /// Append an entry and return its id. Ids never repeat.
    pub(crate) fn push(&mut self, level: LogLevel, source: &str, message: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            id,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            level,
            source: source.to_string(),
            message,
        });
        id
    }

    /// The `limit` newest entries, oldest first. `0` means everything.
    pub(crate) fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let take = match limit {
            0 => self.entries.len(),
            n => n.min(self.entries.len()),
        };
        self.entries
            .iter()
            .skip(self.entries.len() - take)
            .cloned()
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a shared [`LogRingBuffer`]. Each write is mirrored to
/// `tracing` with the entry's source as a field.
#[derive(Clone)]
pub struct DiagnosticLog {
    buffer: Arc<Mutex<LogRingBuffer>>,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(LOG_RING_CAPACITY)
    }
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(LogRingBuffer::new(capacity))),
        }
    }

    pub fn log(&self, level: LogLevel, source: &str, message: impl Into<String>) -> u64 {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!(source, "{message}"),
            LogLevel::Info => tracing::info!(source, "{message}"),
            LogLevel::Warn => tracing::warn!(source, "{message}"),
            LogLevel::Error => tracing::error!(source, "{message}"),
        }
        self.buffer.lock().push(level, source, message)
    }

    pub fn info(&self, source: &str, message: impl Into<String>) -> u64 {
        self.log(LogLevel::Info, source, message)
    }

    pub fn warn(&self, source: &str, message: impl Into<String>) -> u64 {
        self.log(LogLevel::Warn, source, message)
    }

    pub fn error(&self, source: &str, message: impl Into<String>) -> u64 {
        self.log(LogLevel::Error, source, message)
    }

    /// Up to `limit` most recent entries, oldest first (0 = all).
    pub fn entries(&self, limit: usize) -> Vec<LogEntry> {
        self.buffer.lock().recent(limit)
    }

    /// Entries at the given level, oldest first.
    pub fn entries_at(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries(0).into_iter().filter(|e| e.level == level).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
