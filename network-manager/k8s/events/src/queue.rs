//! The shared event queue.
//!
//! The queue is unbounded and FIFO: events enqueued by a single producer are
//! dequeued in the order they were enqueued.

use kube_network_manager_core::Event;
use std::{error::Error, fmt};
use tokio::{sync::mpsc, time};

pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

type CallbackFn = dyn FnOnce(&Event, Option<&(dyn Error + 'static)>) -> Result<(), BoxError> + Send;

/// Acknowledges that an event was processed, successfully or not.
pub struct Callback {
    name: String,
    f: Box<CallbackFn>,
}

/// An event paired with an optional completion callback.
#[derive(Debug)]
pub struct Envelope {
    pub event: Event,
    pub callback: Option<Callback>,
}

#[derive(Clone, Debug)]
pub struct EventTx(mpsc::UnboundedSender<Envelope>);

#[derive(Debug)]
pub struct EventRx(mpsc::UnboundedReceiver<Envelope>);

#[derive(Debug)]
pub enum Dequeue {
    Item(Envelope),
    /// No event arrived before the timeout elapsed.
    Empty,
    /// All producers are gone.
    Closed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("event queue closed")]
pub struct Closed;

pub fn channel() -> (EventTx, EventRx) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventTx(tx), EventRx(rx))
}

// === impl Callback ===

impl Callback {
    pub fn new<F>(name: impl ToString, f: F) -> Self
    where
        F: FnOnce(&Event, Option<&(dyn Error + 'static)>) -> Result<(), BoxError> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            f: Box::new(f),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(
        self,
        event: &Event,
        error: Option<&(dyn Error + 'static)>,
    ) -> Result<(), BoxError> {
        (self.f)(event, error)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.name).finish()
    }
}

// === impl EventTx ===

impl EventTx {
    pub fn enqueue(&self, event: Event, callback: Option<Callback>) -> Result<(), Closed> {
        self.0
            .send(Envelope { event, callback })
            .map_err(|_| Closed)
    }

    pub fn send(&self, event: Event) -> Result<(), Closed> {
        self.enqueue(event, None)
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

// === impl EventRx ===

impl EventRx {
    /// Waits for the next event.
    ///
    /// With a timeout, returns [`Dequeue::Empty`] if nothing arrives in time.
    pub async fn dequeue(&mut self, timeout: Option<time::Duration>) -> Dequeue {
        let next = match timeout {
            Some(timeout) => match time::timeout(timeout, self.0.recv()).await {
                Ok(next) => next,
                Err(_) => return Dequeue::Empty,
            },
            None => self.0.recv().await,
        };
        match next {
            Some(envelope) => Dequeue::Item(envelope),
            None => Dequeue::Closed,
        }
    }

    /// The number of events waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
