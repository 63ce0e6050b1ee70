//! Server-Sent Events framing over HTTP response bodies.
//!
//! Frames are produced by [`eventsource_stream`]; this module adds an
//! idle-read bound per frame and maps stream failures to
//! [`AppError::Transport`].

use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures_util::stream::{Stream, StreamExt};

use crate::{AppError, Result};

/// Event type carrying JSON-RPC payloads.
pub const MESSAGE_EVENT: &str = "message";

type EventItem = std::result::Result<Event, EventStreamError<String>>;

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event type; `message` when the server omitted the `event:` field.
    pub event: String,
    /// Concatenated `data:` lines.
    pub data: String,
    /// Last event id seen on the stream, empty when none.
    pub id: String,
}

impl SseFrame {
    /// Whether this frame carries a JSON-RPC message.
    #[must_use]
    pub fn is_message(&self) -> bool {
        self.event.is_empty() || self.event == MESSAGE_EVENT
    }
}

impl From<Event> for SseFrame {
    fn from(event: Event) -> Self {
        Self {
            event: event.event,
            data: event.data,
            id: event.id,
        }
    }
}

/// Frame iterator with an idle-read timeout.
pub struct SseFrames {
    events: Pin<Box<dyn Stream<Item = EventItem> + Send>>,
    idle: Duration,
}

impl SseFrames {
    /// Iterate the frames of an HTTP response body.
    #[must_use]
    pub fn from_response(response: reqwest::Response, idle: Duration) -> Self {
        Self::from_byte_stream(response.bytes_stream(), idle)
    }

    /// Iterate the frames of any byte stream.
    pub fn from_byte_stream<S, E>(bytes: S, idle: Duration) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Display + 'static,
    {
        let events = bytes
            .map(|chunk| chunk.map_err(|err| err.to_string()))
            .eventsource();
        Self {
            events: Box::pin(events),
            idle,
        }
    }

    /// Next frame, `None` at end of stream.
    ///
    /// Waiting longer than the idle bound yields `AppError::Transport`; so
    /// does a broken body or invalid UTF-8. Callers stop iterating after
    /// the first error.
    pub async fn next_frame(&mut self) -> Option<Result<SseFrame>> {
        match tokio::time::timeout(self.idle, self.events.next()).await {
            Err(_) => Some(Err(AppError::Transport(format!(
                "no sse event within {}s",
                self.idle.as_secs()
            )))),
            Ok(None) => None,
            Ok(Some(Ok(event))) => Some(Ok(SseFrame::from(event))),
            Ok(Some(Err(err))) => Some(Err(AppError::Transport(format!("sse stream error: {err}")))),
        }
    }
}
