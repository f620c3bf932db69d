use crate::{
    cache::{Cache, LabelCache},
    core::{ApiError, FqName, ResourceKind, SharedApi, VncKind, VncObject},
    vnc::{provision, ClusterConfig, Provisioned},
};
use std::{fmt, sync::Arc};

/// Everything resource managers need to reconcile cluster state.
///
/// Built once after bootstrap and shared by every manager and label
/// subscriber; there is exactly one per process.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<ClusterConfig>,
    pub api: SharedApi,
    pub vnc_cache: Cache<VncKind>,
    pub kube_cache: Cache<ResourceKind>,
    pub labels: LabelCache,
    pub provisioned: Arc<Provisioned>,
}

impl Context {
    /// Whether a namespace has been observed by its event source.
    pub fn namespace_exists(&self, namespace: &str) -> bool {
        self.kube_cache
            .find_by_fq_name(ResourceKind::Namespace, &FqName::new([namespace]))
            .is_some()
    }

    /// Returns the project backing a namespace, creating it (and its default
    /// security group) if the controller does not have it yet.
    pub async fn project(&self, namespace: &str) -> anyhow::Result<VncObject> {
        let fq_name = self.config.project_fq_name(namespace);
        if let Some(cached) = self.vnc_cache.find_by_fq_name(VncKind::Project, &fq_name) {
            return Ok(VncObject {
                uuid: Some(cached.uuid().to_string()),
                ..VncObject::new(VncKind::Project, fq_name)
            });
        }
        let project = provision::ensure_project(
            self.api.as_ref(),
            &self.vnc_cache,
            &self.config,
            namespace,
        )
        .await?;
        Ok(project)
    }

    /// Creates an object, or replaces the properties and references of the
    /// existing object with the same fq-name.
    pub async fn upsert(&self, mut obj: VncObject) -> Result<VncObject, ApiError> {
        match self.api.try_read(obj.kind, &obj.fq_name).await? {
            Some(existing) => {
                obj.uuid = existing.uuid;
                self.api.update(&obj).await?;
                tracing::debug!(kind = %obj.kind, name = %obj.fq_name, "Updated");
                self.vnc_cache.apply(&obj);
                Ok(obj)
            }
            None => provision::create_or_get(self.api.as_ref(), &self.vnc_cache, obj).await,
        }
    }

    /// Deletes an object by fq-name.
    ///
    /// Returns false if the controller did not have it.
    pub async fn delete(&self, kind: VncKind, fq_name: &FqName) -> Result<bool, ApiError> {
        provision::delete(self.api.as_ref(), &self.vnc_cache, kind, fq_name).await
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("labels", &self.labels)
            .finish_non_exhaustive()
    }
}
