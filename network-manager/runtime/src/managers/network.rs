use super::ResourceManager;
use crate::{
    core::{
        network::{
            VirtualNetworkProperties, VnSubnets, ADDRESS_ALLOCATION_MODE_ATTR, FLAT_SUBNET_ONLY,
            VN_PROPERTIES_ATTR,
        },
        ChangeType, Event, FqName, VncKind, VncObject,
    },
    k8s::network_attachment::NetworkAttachmentDefinitionSpec,
    Context,
};
use anyhow::{Context as _, Result};
use serde_json::json;

/// Backs each network attachment definition with a virtual network in the
/// project of its namespace, allocated from the cluster's pod IPAM.
#[derive(Debug)]
pub struct NetworkManager {
    ctx: Context,
}

impl NetworkManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    fn network_fq_name(&self, namespace: &str, name: &str) -> FqName {
        self.ctx
            .config
            .project_fq_name(namespace)
            .child(format!("{}-{namespace}-{name}", self.ctx.config.cluster_name))
    }

    async fn apply(&self, namespace: &str, name: &str, event: &Event) -> Result<()> {
        if !self.ctx.namespace_exists(namespace) {
            tracing::info!(%namespace, %name, "Deferring until the namespace is observed");
            return Ok(());
        }
        self.ctx.project(namespace).await?;

        let spec = event
            .object
            .get("spec")
            .cloned()
            .map(serde_json::from_value::<NetworkAttachmentDefinitionSpec>)
            .transpose()
            .context("invalid network attachment definition")?
            .unwrap_or_default();
        let cni_config = spec
            .cni_config()
            .with_context(|| format!("invalid CNI configuration in {namespace}/{name}"))?
            .map(|config| config.to_string())
            .unwrap_or_default();

        let ipam_fq_name = &self.ctx.provisioned.pod_ipam;
        let ipam = match self
            .ctx
            .vnc_cache
            .find_by_fq_name(VncKind::NetworkIpam, ipam_fq_name)
        {
            Some(cached) => VncObject {
                uuid: Some(cached.uuid().to_string()),
                ..VncObject::new(VncKind::NetworkIpam, ipam_fq_name.clone())
            },
            None => self
                .ctx
                .api
                .read(VncKind::NetworkIpam, ipam_fq_name)
                .await
                .context("failed to read the pod IPAM")?,
        };

        let mut vn = VncObject::new(
            VncKind::VirtualNetwork,
            self.network_fq_name(namespace, name),
        )
        .with_parent(VncKind::Project);
        vn.set_attr(ADDRESS_ALLOCATION_MODE_ATTR, FLAT_SUBNET_ONLY)?;
        vn.set_attr(VN_PROPERTIES_ATTR, VirtualNetworkProperties::l3())?;
        vn.attributes.insert(
            "annotations".to_string(),
            json!({
                "key_value_pair": [
                    { "key": "namespace", "value": namespace },
                    { "key": "network-attachment-definition", "value": name },
                    { "key": "cni-config", "value": cni_config },
                ],
            }),
        );
        vn.add_ref(&ipam, Some(serde_json::to_value(VnSubnets::default())?));

        self.ctx
            .upsert(vn)
            .await
            .with_context(|| format!("failed to apply network {namespace}/{name}"))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ResourceManager for NetworkManager {
    async fn process(&self, event: &Event) -> Result<()> {
        let Some(namespace) = event.namespace.as_deref() else {
            anyhow::bail!("network attachment definition {} has no namespace", event.name);
        };
        match event.change {
            ChangeType::Added | ChangeType::Modified => {
                self.apply(namespace, &event.name, event).await
            }
            ChangeType::Deleted => {
                let fq_name = self.network_fq_name(namespace, &event.name);
                self.ctx
                    .delete(VncKind::VirtualNetwork, &fq_name)
                    .await
                    .with_context(|| format!("failed to delete network {fq_name}"))?;
                Ok(())
            }
            ChangeType::Sync => Ok(()),
        }
    }
}
