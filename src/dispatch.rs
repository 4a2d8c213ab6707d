//! Sequential dispatch of an [`EventStream`] to synchronous handlers.

use tokio_util::sync::CancellationToken;

use crate::event::Event;
use crate::source::{self, EventStream};

/// Why a [`Dispatcher`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation token fired.
    Cancelled,
    /// The source reported an error, which was passed to the error handler.
    StreamError,
    /// The source ended without reporting an error.
    StreamClosed,
}

enum Next {
    Cancelled,
    Event(Option<Event>),
    Error(source::Error),
}

/// Feeds events one at a time to `on_event` until the stream fails or the
/// dispatcher is cancelled.
///
/// Each handler call completes before the next event is received, so the
/// event handler never runs concurrently with itself. A dispatcher runs once;
/// resuming after it stops requires a new source connection.
pub struct Dispatcher<H, E> {
    stream: EventStream,
    on_event: H,
    on_error: E,
}

impl<H, E> Dispatcher<H, E>
where
    H: FnMut(Event),
    E: FnOnce(source::Error),
{
    pub fn new(stream: EventStream, on_event: H, on_error: E) -> Self {
        Self {
            stream,
            on_event,
            on_error,
        }
    }

    /// Runs the dispatch loop to completion.
    ///
    /// Cancellation is only observed while waiting for the next event; a handler
    /// call in progress is never interrupted. Events that arrived before an error
    /// are delivered before the error handler runs.
    pub async fn run(self, cancel: &CancellationToken) -> StopReason {
        let Self {
            mut stream,
            mut on_event,
            on_error,
        } = self;

        log::info!("Beginning event loop");
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => Next::Cancelled,
                event = stream.events.recv() => Next::Event(event),
                Some(err) = stream.errors.recv() => Next::Error(err),
            };

            match next {
                Next::Event(Some(event)) => on_event(event),
                Next::Event(None) => {
                    // All senders are gone, so a pending error is already buffered.
                    return match stream.errors.recv().await {
                        Some(err) => {
                            on_error(err);
                            StopReason::StreamError
                        }
                        None => {
                            log::info!("Event stream closed");
                            StopReason::StreamClosed
                        }
                    };
                }
                Next::Error(err) => {
                    on_error(err);
                    return StopReason::StreamError;
                }
                Next::Cancelled => {
                    log::info!("Event loop cancelled");
                    return StopReason::Cancelled;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Actor, ContainerID};
    use crate::source::{docker, event_stream};

    fn event(action: &str, id: &str) -> Event {
        Event::new(action, Actor::new(ContainerID::new(id).unwrap()))
    }

    fn stream_error() -> docker::Error {
        docker::Error::Status {
            status: hyper::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[tokio::test]
    async fn test_events_are_delivered_in_order() {
        let (tx, stream) = event_stream(8);
        for id in ["a", "b", "c"] {
            assert!(tx.send(event("start", id)).await);
        }
        drop(tx);

        let mut seen = Vec::new();
        let mut errors = 0;
        let reason = Dispatcher::new(
            stream,
            |event: Event| seen.push(event.actor.id.to_string()),
            |_| errors += 1,
        )
        .run(&CancellationToken::new())
        .await;

        assert_eq!(reason, StopReason::StreamClosed);
        assert_eq!(seen, ["a", "b", "c"]);
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn test_error_stops_dispatch() {
        let (tx, stream) = event_stream(8);
        let producer = tokio::spawn(async move {
            assert!(tx.send(event("start", "a")).await);
            tx.fail(stream_error()).await;
        });

        let mut seen = 0;
        let mut errors = Vec::new();
        let reason = Dispatcher::new(
            stream,
            |_| seen += 1,
            |err: source::Error| errors.push(err.to_string()),
        )
        .run(&CancellationToken::new())
        .await;
        producer.await.unwrap();

        assert_eq!(reason, StopReason::StreamError);
        assert_eq!(seen, 1);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("500"), "{}", errors[0]);
    }

    #[tokio::test]
    async fn test_no_events_are_handled_after_error() {
        let (tx, stream) = event_stream(8);
        let (events_tx, errors_tx) = (tx.events.clone(), tx.errors.clone());
        errors_tx
            .send(source::Error::from(stream_error()))
            .await
            .unwrap();
        drop(tx);

        let mut seen = 0;
        let mut errors = 0;
        let dispatcher = Dispatcher::new(stream, |_| seen += 1, |_| errors += 1);
        let reason = dispatcher.run(&CancellationToken::new()).await;

        // The dispatcher has stopped, later events go nowhere.
        assert!(events_tx.send(event("start", "a")).await.is_err());
        assert_eq!(reason, StopReason::StreamError);
        assert_eq!(seen, 0);
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_dispatch() {
        let (tx, stream) = event_stream(8);
        let cancel = CancellationToken::new();

        let mut seen = 0;
        let mut errors = 0;
        let dispatcher = Dispatcher::new(stream, |_| seen += 1, |_| errors += 1);
        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                cancel.cancel();
            })
        };
        let reason = dispatcher.run(&cancel).await;
        canceller.await.unwrap();

        assert_eq!(reason, StopReason::Cancelled);
        assert!(!tx.send(event("start", "a")).await);
        assert_eq!(seen, 0);
        assert_eq!(errors, 0);
    }

    #[tokio::test]
    async fn test_cancellation_takes_priority_over_pending_events() {
        let (tx, stream) = event_stream(8);
        assert!(tx.send(event("start", "a")).await);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut seen = 0;
        let reason = Dispatcher::new(stream, |_| seen += 1, |_| {})
            .run(&cancel)
            .await;

        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(seen, 0);
    }
}
