use super::ResourceManager;
use crate::core::Event;
use anyhow::Result;

/// Endpoints are mirrored into the Kubernetes object cache by their event
/// source; there is no controller state to maintain for them.
#[derive(Debug, Default)]
pub struct EndpointsManager;

#[async_trait::async_trait]
impl ResourceManager for EndpointsManager {
    async fn process(&self, event: &Event) -> Result<()> {
        tracing::debug!(
            change = %event.change,
            namespace = event.namespace.as_deref().unwrap_or(""),
            name = %event.name,
            "Endpoints changed"
        );
        Ok(())
    }
}
