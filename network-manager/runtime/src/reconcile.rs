//! The reconciliation loop.
//!
//! A single task drains the event queue and dispatches each event to the
//! resource manager registered for its kind. `Sync` events drive the kind's
//! periodic resync instead of `process`.
//!
//! Handler failures, including panics, never stop the loop: they are logged
//! and handed to the event's callback. A callback that fails is fatal, since
//! the producer can no longer trust that its events are acknowledged.

use crate::{
    core::{ChangeType, Event, UnknownKind},
    events::{BoxError, Dequeue, Envelope, EventRx},
    managers::Managers,
    metrics::Metrics,
};
use futures::prelude::*;
use std::{any::Any, error::Error, panic::AssertUnwindSafe};
use tokio::time;

pub struct Reconciler {
    rx: EventRx,
    managers: Managers,
    idle_timeout: Option<time::Duration>,
    metrics: Metrics,
}

/// Describes why an event could not be handled.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    UnknownKind(#[from] UnknownKind),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// An event's callback failed. The loop stops.
#[derive(Debug, thiserror::Error)]
#[error("callback {callback} failed for {event}")]
pub struct Fatal {
    pub event: Event,
    pub callback: String,
    #[source]
    pub source: BoxError,
    /// The error the callback was notified of, if handling failed.
    pub handler_error: Option<HandlerError>,
}

// === impl Reconciler ===

impl Reconciler {
    pub fn new(rx: EventRx, managers: Managers, metrics: Metrics) -> Self {
        Self {
            rx,
            managers,
            idle_timeout: None,
            metrics,
        }
    }

    /// Wakes the loop when no event arrives within `timeout`.
    pub fn with_idle_timeout(mut self, timeout: time::Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Processes events until every producer is gone, or until a callback
    /// fails.
    pub async fn run(mut self) -> Result<(), Fatal> {
        loop {
            match self.rx.dequeue(self.idle_timeout).await {
                Dequeue::Item(envelope) => self.handle(envelope).await?,
                Dequeue::Empty => {
                    tracing::trace!("Idle");
                    tokio::task::yield_now().await;
                }
                Dequeue::Closed => {
                    tracing::info!("Event queue closed");
                    return Ok(());
                }
            }
        }
    }

    async fn handle(&self, Envelope { event, callback }: Envelope) -> Result<(), Fatal> {
        tracing::debug!(
            kind = %event.kind,
            change = %event.change,
            namespace = event.namespace.as_deref().unwrap_or(""),
            name = %event.name,
            uid = %event.uid,
            "Processing"
        );
        self.metrics.event(&event.kind, event.change);

        let result = self.dispatch(&event).await;
        if let Err(error) = &result {
            self.metrics.event_error(&event.kind, event.change);
            match error {
                HandlerError::UnknownKind(_) => {
                    self.metrics.unknown_kind(&event.kind);
                    tracing::warn!(%event, "No resource manager for kind");
                }
                HandlerError::Failed(error) => {
                    tracing::error!(%event, "Failed to handle event: {error:#}");
                }
                HandlerError::Panicked(_) => {
                    tracing::error!(%event, %error, "Failed to handle event");
                }
            }
        }

        let Some(callback) = callback else {
            return Ok(());
        };
        let name = callback.name().to_string();
        let handler_error = result.err();
        let notified = handler_error
            .as_ref()
            .map(|e| e as &(dyn Error + 'static));
        if let Err(source) = callback.call(&event, notified) {
            tracing::error!(
                %event,
                callback = %name,
                error = %source,
                handler_error = ?handler_error,
                "Event callback failed"
            );
            return Err(Fatal {
                event,
                callback: name,
                source,
                handler_error,
            });
        }
        Ok(())
    }

    async fn dispatch(&self, event: &Event) -> Result<(), HandlerError> {
        let kind = event.resource_kind()?;
        let manager = self
            .managers
            .get(&kind)
            .ok_or_else(|| UnknownKind(event.kind.clone()))?;

        let handled = async {
            if event.change == ChangeType::Sync {
                manager.timer().await
            } else {
                manager.process(event).await
            }
        };
        match AssertUnwindSafe(handled).catch_unwind().await {
            Ok(result) => Ok(result?),
            Err(panic) => Err(HandlerError::Panicked(panic_message(panic))),
        }
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds = self.managers.keys().collect::<Vec<_>>();
        kinds.sort();
        f.debug_struct("Reconciler")
            .field("kinds", &kinds)
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = panic.downcast_ref::<String>() {
        return msg.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests;
