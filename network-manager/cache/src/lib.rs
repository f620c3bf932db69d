//! Local state shared between the event sources and the reconciliation loop.
//!
//! - [`Cache`] mirrors objects by uuid, partitioned by kind. Each partition is
//!   written by a single owner (an event source, or the reconciliation loop
//!   for controller objects) and may be read from anywhere.
//! - [`LabelCache`] tracks which objects carry which labels and notifies
//!   subscribers when a label becomes active or inactive in the cluster.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cache;
pub mod labels;

pub use self::{
    cache::{Cache, CacheKind, Cached, State},
    labels::LabelCache,
};
