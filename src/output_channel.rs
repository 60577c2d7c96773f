//! Named text sink for the worker's console output.
//!
//! Text is appended exactly as decoded, with no line splitting. The retained
//! contents are capped; the oldest text is dropped first. Followers subscribed
//! through [`OutputChannel::subscribe`] see every chunk appended after they
//! subscribed.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Retained text limit (1 MiB).
pub(crate) const MAX_RETAINED_BYTES: usize = 1024 * 1024;

/// Chunks buffered per follower before it starts lagging.
const FOLLOWER_CAPACITY: usize = 256;

struct ChannelInner {
    name: String,
    contents: Mutex<String>,
    max_bytes: usize,
    tx: broadcast::Sender<String>,
}

#[derive(Clone)]
pub struct OutputChannel {
    inner: Arc<ChannelInner>,
}

impl OutputChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_limit(name, MAX_RETAINED_BYTES)
    }

    pub(crate) fn with_limit(name: impl Into<String>, max_bytes: usize) -> Self {
        let (tx, _) = broadcast::channel(FOLLOWER_CAPACITY);
        Self {
            inner: Arc::new(ChannelInner {
                name: name.into(),
                contents: Mutex::new(String::new()),
                max_bytes,
                tx,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Append text as-is.
    pub fn append(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        {
            let mut contents = self.inner.contents.lock();
            contents.push_str(text);
            trim_front(&mut contents, self.inner.max_bytes);
        }
        tracing::trace!(channel = %self.inner.name, bytes = text.len(), "output appended");
        // No followers is fine
        let _ = self.inner.tx.send(text.to_string());
    }

    /// Everything retained so far.
    pub fn contents(&self) -> String {
        self.inner.contents.lock().clone()
    }

    /// Follow chunks appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.inner.tx.subscribe()
    }
}

/// Drop text from the front until `s` fits in `max_bytes`, cutting on a char boundary.
fn trim_front(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = s.len() - max_bytes;
    while !s.is_char_boundary(cut) {
        cut += 1;
    }
    s.drain(..cut);
}
