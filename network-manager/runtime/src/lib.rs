#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use kube_network_manager_cache as cache;
pub use kube_network_manager_core as core;
pub use kube_network_manager_k8s_api as k8s;
pub use kube_network_manager_k8s_events as events;
pub use kube_network_manager_vnc as vnc;

mod args;
mod context;
pub mod managers;
mod metrics;
pub mod reconcile;

pub use self::{
    args::Args,
    context::Context,
    managers::ResourceManager,
    reconcile::{Fatal, HandlerError, Reconciler},
};
