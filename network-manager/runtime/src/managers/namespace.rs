use super::{owner_id, ResourceManager};
use crate::{
    core::{labels_of, ChangeType, Event, ResourceKind, VncKind},
    Context,
};
use anyhow::{Context as _, Result};
use std::collections::BTreeMap;

/// Backs each namespace with a controller project and a default security
/// group, and publishes namespace labels.
#[derive(Debug)]
pub struct NamespaceManager {
    ctx: Context,
}

impl NamespaceManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    async fn apply(&self, uid: &str, name: &str, labels: BTreeMap<String, String>) -> Result<()> {
        self.ctx
            .project(name)
            .await
            .with_context(|| format!("failed to ensure the project of namespace {name}"))?;
        self.ctx
            .labels
            .set_labels(&owner_id(ResourceKind::Namespace, uid), labels)
            .await;
        Ok(())
    }

    async fn remove(&self, uid: &str, name: &str) -> Result<()> {
        self.ctx
            .labels
            .clear_owner(&owner_id(ResourceKind::Namespace, uid))
            .await;

        let project = self.ctx.config.project_fq_name(name);
        if project == self.ctx.provisioned.default_project.fq_name
            || project == self.ctx.provisioned.system_project.fq_name
        {
            tracing::debug!(namespace = %name, "Keeping cluster project");
            return Ok(());
        }

        let sg = project.child(self.ctx.config.default_sg_name(name));
        self.ctx
            .delete(VncKind::SecurityGroup, &sg)
            .await
            .with_context(|| format!("failed to delete security group {sg}"))?;
        self.ctx
            .delete(VncKind::Project, &project)
            .await
            .with_context(|| format!("failed to delete project {project}"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceManager for NamespaceManager {
    async fn process(&self, event: &Event) -> Result<()> {
        match event.change {
            ChangeType::Added | ChangeType::Modified => {
                self.apply(&event.uid, &event.name, event.labels()).await
            }
            ChangeType::Deleted => self.remove(&event.uid, &event.name).await,
            ChangeType::Sync => self.timer().await,
        }
    }

    async fn timer(&self) -> Result<()> {
        let mut failed = 0usize;
        for ns in self.ctx.kube_cache.list(ResourceKind::Namespace) {
            let name = ns.fq_name().name().to_string();
            let labels = labels_of(&ns.attributes());
            if let Err(error) = self.apply(ns.uuid(), &name, labels).await {
                tracing::error!(namespace = %name, "Failed to resync namespace: {error:#}");
                failed += 1;
            }
        }
        if failed > 0 {
            anyhow::bail!("failed to resync {failed} namespaces");
        }
        Ok(())
    }
}
