//! Container runtime event sources.
//!
//! A source is connected up front, which fails synchronously if the runtime
//! cannot be reached, and is then turned into an [`EventStream`] by spawning a
//! pump task. The stream delivers events in arrival order followed by at most
//! one terminal error.
pub mod containerd;
pub mod docker;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::event::Event;

/// Terminal failure of an event source.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Docker(#[from] docker::Error),
    #[error(transparent)]
    Containerd(#[from] containerd::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A connected runtime that can stream lifecycle events.
pub trait EventSource {
    /// Starts delivering events until the runtime fails, the stream ends, or
    /// `cancel` fires.
    ///
    /// Must be called from within a tokio runtime.
    fn into_stream(self, cancel: CancellationToken, capacity: usize) -> EventStream;
}

/// Receiving half of an event source: ordered events plus a terminal error.
#[derive(Debug)]
pub struct EventStream {
    pub(crate) events: mpsc::Receiver<Event>,
    pub(crate) errors: mpsc::Receiver<Error>,
}

/// Sending half of an [`EventStream`], owned by a source's pump task.
///
/// Not `Clone`: once the event channel reports closed, the error channel is
/// closed as well and any error is already buffered.
#[derive(Debug)]
pub struct StreamSender {
    pub(crate) events: mpsc::Sender<Event>,
    pub(crate) errors: mpsc::Sender<Error>,
}

/// Creates a connected [`StreamSender`]/[`EventStream`] pair.
///
/// `capacity` bounds the number of undelivered events; a full buffer blocks the
/// sender, which in turn stops reading from the runtime.
pub fn event_stream(capacity: usize) -> (StreamSender, EventStream) {
    let (events_tx, events_rx) = mpsc::channel(capacity.max(1));
    let (errors_tx, errors_rx) = mpsc::channel(1);
    (
        StreamSender {
            events: events_tx,
            errors: errors_tx,
        },
        EventStream {
            events: events_rx,
            errors: errors_rx,
        },
    )
}

impl StreamSender {
    /// Delivers an event, waiting for buffer space.
    ///
    /// Returns `false` if the receiving side is gone.
    pub async fn send(&self, event: Event) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Reports the terminal error and closes the stream.
    pub async fn fail(self, err: impl Into<Error>) {
        let err = err.into();
        if let Err(mpsc::error::SendError(err)) = self.errors.send(err).await {
            log::debug!("Event stream closed before error could be delivered: {err}");
        }
    }

    /// Resolves once the receiving side has been dropped.
    pub async fn closed(&self) {
        self.events.closed().await
    }
}
