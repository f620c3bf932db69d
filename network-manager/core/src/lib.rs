#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod event;
pub mod firewall;
mod fq_name;
pub mod health;
pub mod network;
pub mod policy;
mod vnc;

pub use self::{
    event::{labels_of, ChangeType, Event, ResourceKind, UnknownKind},
    fq_name::FqName,
    vnc::{ApiError, Create, ObjRef, SharedApi, VncApi, VncKind, VncObject},
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};

/// The name this manager reports itself as, e.g. in health updates.
pub const MANAGER_NAME: &str = "kube-network-manager";
