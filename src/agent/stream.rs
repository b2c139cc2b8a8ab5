//! Streaming transport between the orchestrator and the HTTP response.
//!
//! The orchestrator writes [`StreamEvent`]s into an [`EventSink`]; the
//! server drains the paired receiver into Server-Sent-Event frames. When
//! the client goes away the sink quietly turns into a no-op so the round
//! can finish (and persist) in the background.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

/// Literal payload of the terminal success frame.
pub const DONE_MARKER: &str = "[DONE]";

/// One event sent to the widget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text to append to the assistant message.
    Text(String),
    /// The system is waiting on an external actor.
    Waiting(String),
    /// Terminal failure notice.
    Error(String),
    /// Terminal success marker.
    Done,
}

impl StreamEvent {
    /// The `data:` payload for this event.
    #[must_use]
    pub fn to_sse_data(&self) -> String {
        match self {
            Self::Text(text) => json!({ "text": text }).to_string(),
            Self::Waiting(message) => json!({ "type": "waiting", "message": message }).to_string(),
            Self::Error(message) => json!({ "type": "error", "message": message }).to_string(),
            Self::Done => DONE_MARKER.to_string(),
        }
    }

    /// The complete SSE frame for this event.
    #[must_use]
    pub fn to_frame(&self) -> String {
        format!("data: {}\n\n", self.to_sse_data())
    }

    /// Returns `true` for [`StreamEvent::Done`] and [`StreamEvent::Error`].
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// Write side of the event channel.
#[derive(Debug)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
    closed: AtomicBool,
}

impl EventSink {
    /// Sends an event. Returns `false` (and stays closed) once the consumer
    /// has gone away.
    pub async fn send(&self, event: StreamEvent) -> bool {
        if self.is_closed() {
            return false;
        }
        if self.tx.send(event).await.is_err() {
            if !self.closed.swap(true, Ordering::SeqCst) {
                debug!("stream consumer disconnected; continuing without output");
            }
            return false;
        }
        true
    }

    /// Returns `true` once a send has failed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Creates a bounded event channel.
#[must_use]
pub fn channel(capacity: usize) -> (EventSink, ReceiverStream<StreamEvent>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSink {
            tx,
            closed: AtomicBool::new(false),
        },
        ReceiverStream::new(rx),
    )
}

/// Splits `text` into pieces of at most `size` grapheme clusters.
///
/// Concatenating the pieces yields `text` exactly.
#[must_use]
pub fn split_for_streaming(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.grapheme_indices(true) {
        if count == size {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}
