//! Turns Kubernetes watches into a single, ordered stream of canonical events.
//!
//! Each watched kind is driven by its own [`EventSource`] task. Sources only
//! ever append to the shared queue and write to their own kind's partition of
//! the Kubernetes object cache. A single consumer drains the queue via
//! [`EventRx::dequeue`].
//!
//! ```text
//! [ watch(Pod) ] -> [ EventSource<Pod> ] --\
//! [ watch(Namespace) ] -> [ EventSource<Namespace> ] --> [ queue ] -> reconciler
//! [ sync ticker ] --------------------------------------/
//! ```

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod queue;
mod source;
mod ticker;

pub use self::{
    queue::{channel, BoxError, Callback, Closed, Dequeue, Envelope, EventRx, EventTx},
    source::EventSource,
    ticker::sync_ticker,
};
