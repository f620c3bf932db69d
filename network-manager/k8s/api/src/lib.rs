#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod labels;
pub mod network_attachment;

pub use self::{
    labels::{Labels, Selector},
    network_attachment::NetworkAttachmentDefinition,
};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Endpoints, Namespace, Pod, Service},
        networking::v1::{Ingress, NetworkPolicy},
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};
pub use kube::{
    api::{Api, ObjectMeta, ResourceExt},
    runtime::watcher,
    Client, Error, Resource,
};

use kube_network_manager_core::ResourceKind;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// A cluster-scoped or namespaced Kubernetes resource that is watched and
/// reconciled by the manager.
pub trait Watched:
    Resource<DynamicType = ()>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    const KIND: ResourceKind;
}

impl Watched for Namespace {
    const KIND: ResourceKind = ResourceKind::Namespace;
}

impl Watched for Pod {
    const KIND: ResourceKind = ResourceKind::Pod;
}

impl Watched for Service {
    const KIND: ResourceKind = ResourceKind::Service;
}

impl Watched for NetworkPolicy {
    const KIND: ResourceKind = ResourceKind::NetworkPolicy;
}

impl Watched for Ingress {
    const KIND: ResourceKind = ResourceKind::Ingress;
}

impl Watched for Endpoints {
    const KIND: ResourceKind = ResourceKind::Endpoints;
}

impl Watched for NetworkAttachmentDefinition {
    const KIND: ResourceKind = ResourceKind::NetworkAttachmentDefinition;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_kinds_match_api_kinds() {
        fn check<T: Watched>() {
            assert_eq!(T::kind(&()), T::KIND.as_str());
        }
        check::<Namespace>();
        check::<Pod>();
        check::<Service>();
        check::<NetworkPolicy>();
        check::<Ingress>();
        check::<Endpoints>();
        check::<NetworkAttachmentDefinition>();
    }
}
