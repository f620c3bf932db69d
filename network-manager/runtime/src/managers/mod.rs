//! Resource managers translate Kubernetes changes into network controller
//! state. Each manager owns exactly one resource kind.

use crate::{
    core::{Event, ResourceKind},
    Context,
};
use ahash::AHashMap as HashMap;
use anyhow::Result;
use std::sync::Arc;

mod endpoints;
mod labeled;
mod namespace;
mod network;
mod network_policy;
pub mod tags;

pub use self::{
    endpoints::EndpointsManager, labeled::LabeledManager, namespace::NamespaceManager,
    network::NetworkManager, network_policy::NetworkPolicyManager,
};

#[async_trait::async_trait]
pub trait ResourceManager: Send + Sync + 'static {
    /// Applies a single object change.
    async fn process(&self, event: &Event) -> Result<()>;

    /// Periodically corrects drift for the whole kind. Must be safe to call
    /// arbitrarily often.
    async fn timer(&self) -> Result<()> {
        Ok(())
    }
}

pub type Managers = HashMap<ResourceKind, Arc<dyn ResourceManager>>;

/// Builds a manager for every supported kind.
pub fn all(ctx: &Context) -> Managers {
    let mut managers = Managers::default();
    managers.insert(
        ResourceKind::Namespace,
        Arc::new(NamespaceManager::new(ctx.clone())) as Arc<dyn ResourceManager>,
    );
    for kind in [
        ResourceKind::Pod,
        ResourceKind::Service,
        ResourceKind::Ingress,
    ] {
        managers.insert(kind, Arc::new(LabeledManager::new(ctx.clone(), kind)));
    }
    managers.insert(
        ResourceKind::NetworkPolicy,
        Arc::new(NetworkPolicyManager::new(ctx.clone())),
    );
    managers.insert(ResourceKind::Endpoints, Arc::new(EndpointsManager));
    managers.insert(
        ResourceKind::NetworkAttachmentDefinition,
        Arc::new(NetworkManager::new(ctx.clone())),
    );
    managers
}

/// Identifies an object as the owner of label associations.
fn owner_id(kind: ResourceKind, uid: &str) -> String {
    format!("{kind}/{uid}")
}

#[cfg(test)]
pub(crate) mod tests;
