//! Access to the network controller.
//!
//! - [`ConnectionManager`] establishes the controller connection, retrying at
//!   a fixed interval and reporting connection status, then supervises it
//!   and resyncs the object cache when the controller comes back.
//! - [`resync`] seeds the local object cache from the controller.
//! - [`Bootstrap`] idempotently provisions the cluster-wide networking
//!   resources that namespaces and pods are attached to.
//! - [`HttpApi`] speaks the controller's REST API, failing over between
//!   controller replicas; [`MemoryApi`] is an in-process controller used for
//!   dry runs and tests.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod config;
mod connect;
pub mod health;
mod http;
mod memory;
pub mod provision;
pub mod resync;

pub use self::{
    config::ClusterConfig,
    connect::{ConnectionManager, Connector},
    http::{HttpApi, HttpConnector},
    memory::MemoryApi,
    provision::{Bootstrap, NatPools, Provisioned, SecurityPolicies},
};
