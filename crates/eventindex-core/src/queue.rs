//! Bounded, ordered hand-off channel between the index loop and its consumer.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;
use crate::types::Event;

/// Create a queue with room for `capacity` events.
///
/// Pushes on the returned sender block while the queue is full and give up
/// with [`IndexerError::Cancelled`] once `cancel` fires.
pub fn channel(capacity: usize, cancel: CancellationToken) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx, cancel }, EventReceiver { rx })
}

/// Producer half, cloned into each indexing phase.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl EventSender {
    /// Push one event, waiting for space.
    pub async fn push(&self, event: Event) -> Result<(), IndexerError> {
        if self.cancel.is_cancelled() {
            return Err(IndexerError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(IndexerError::Cancelled),
            res = self.tx.send(event) => res.map_err(|_| IndexerError::ConsumerClosed),
        }
    }

    /// Push a batch in order. Stops at the first failure.
    pub async fn push_all(&self, events: Vec<Event>) -> Result<usize, IndexerError> {
        let count = events.len();
        for event in events {
            self.push(event).await?;
        }
        Ok(count)
    }

    /// Returns `true` if the consumer dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half, returned by `Indexer::run`.
///
/// Yields events until every producer has exited, then returns `None`.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::Receiver<Event>,
}

impl EventReceiver {
    /// Receive the next event, or `None` once the indexer has stopped.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Number of events waiting in the queue.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Stop accepting new events; already-queued events can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Stream for EventReceiver {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}
