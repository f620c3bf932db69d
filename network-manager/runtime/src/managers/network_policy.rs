use super::ResourceManager;
use crate::{
    core::{
        labels_of, policy::PolicyEntries, ChangeType, Event, FqName, ResourceKind, VncKind,
        VncObject,
    },
    k8s::{LabelSelector, Labels, Selector},
    Context,
};
use anyhow::{Context as _, Result};
use serde_json::{json, Value};

const NAMESPACE_KEY: &str = "namespace";
const POLICY_KEY: &str = "network-policy";
const SPEC_KEY: &str = "spec";
const SELECTED_PODS_KEY: &str = "selected-pods";

/// Mirrors each Kubernetes network policy as a security group in the
/// project of its namespace.
#[derive(Debug)]
pub struct NetworkPolicyManager {
    ctx: Context,
}

impl NetworkPolicyManager {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    fn group_fq_name(&self, namespace: &str, name: &str) -> FqName {
        self.ctx
            .config
            .project_fq_name(namespace)
            .child(format!("{}-np-{namespace}-{name}", self.ctx.config.cluster_name))
    }

    async fn apply(&self, namespace: &str, name: &str, object: &Value) -> Result<()> {
        if !self.ctx.namespace_exists(namespace) {
            tracing::info!(%namespace, %name, "Deferring until the namespace is observed");
            return Ok(());
        }
        self.ctx.project(namespace).await?;

        let selected = self.selected_pods(namespace, object)?;
        let spec = object.get("spec").cloned().unwrap_or(Value::Null);

        let mut sg = VncObject::new(VncKind::SecurityGroup, self.group_fq_name(namespace, name))
            .with_parent(VncKind::Project);
        sg.attributes.insert(
            "id_perms".to_string(),
            json!({ "enable": true, "description": format!("NetworkPolicy {namespace}/{name}") }),
        );
        sg.attributes.insert(
            "annotations".to_string(),
            json!({
                "key_value_pair": [
                    { "key": NAMESPACE_KEY, "value": namespace },
                    { "key": POLICY_KEY, "value": name },
                    { "key": SPEC_KEY, "value": spec.to_string() },
                    { "key": SELECTED_PODS_KEY, "value": selected.join(",") },
                ],
            }),
        );
        sg.set_attr("security_group_entries", PolicyEntries::default())?;

        self.ctx
            .upsert(sg)
            .await
            .with_context(|| format!("failed to apply network policy {namespace}/{name}"))?;
        Ok(())
    }

    /// Names the cached pods of the namespace that the policy applies to.
    fn selected_pods(&self, namespace: &str, object: &Value) -> Result<Vec<String>> {
        let selector = match object.pointer("/spec/podSelector") {
            Some(selector) => {
                let selector = serde_json::from_value::<LabelSelector>(selector.clone())
                    .context("invalid pod selector")?;
                Selector::try_from(&selector)?
            }
            None => Selector::default(),
        };

        let mut pods = self
            .ctx
            .kube_cache
            .list(ResourceKind::Pod)
            .into_iter()
            .filter(|pod| {
                let fq_name = pod.fq_name();
                fq_name.parent().as_ref().map(FqName::name) == Some(namespace)
                    && selector.matches(&Labels::from(labels_of(&pod.attributes())))
            })
            .map(|pod| pod.fq_name().name().to_string())
            .collect::<Vec<_>>();
        pods.sort();
        Ok(pods)
    }
}

#[async_trait::async_trait]
impl ResourceManager for NetworkPolicyManager {
    async fn process(&self, event: &Event) -> Result<()> {
        let Some(namespace) = event.namespace.as_deref() else {
            anyhow::bail!("network policy {} has no namespace", event.name);
        };
        match event.change {
            ChangeType::Added | ChangeType::Modified => {
                self.apply(namespace, &event.name, &event.object).await
            }
            ChangeType::Deleted => {
                let fq_name = self.group_fq_name(namespace, &event.name);
                self.ctx
                    .delete(VncKind::SecurityGroup, &fq_name)
                    .await
                    .with_context(|| format!("failed to delete security group {fq_name}"))?;
                Ok(())
            }
            ChangeType::Sync => self.timer().await,
        }
    }

    async fn timer(&self) -> Result<()> {
        let mut failed = 0usize;
        for group in self.ctx.vnc_cache.list(VncKind::SecurityGroup) {
            let attributes = group.attributes();
            let (Some(namespace), Some(name)) = (
                annotation(&attributes, NAMESPACE_KEY),
                annotation(&attributes, POLICY_KEY),
            ) else {
                continue;
            };
            let policy = FqName::new([namespace.as_str(), name.as_str()]);
            if self
                .ctx
                .kube_cache
                .find_by_fq_name(ResourceKind::NetworkPolicy, &policy)
                .is_none()
            {
                tracing::info!(
                    %namespace,
                    %name,
                    "Deleting the security group of a vanished network policy"
                );
                let fq_name = group.fq_name();
                if let Err(error) = self.ctx.delete(VncKind::SecurityGroup, &fq_name).await {
                    tracing::error!(%namespace, %name, %error, "Failed to delete security group");
                    failed += 1;
                }
            }
        }

        for policy in self.ctx.kube_cache.list(ResourceKind::NetworkPolicy) {
            let fq_name = policy.fq_name();
            let Some(namespace) = fq_name.parent() else {
                continue;
            };
            let (namespace, name) = (namespace.name(), fq_name.name());
            if let Err(error) = self.apply(namespace, name, &policy.attributes()).await {
                tracing::error!(%namespace, %name, "Failed to resync network policy: {error:#}");
                failed += 1;
            }
        }

        if failed > 0 {
            anyhow::bail!("failed to resync {failed} network policies");
        }
        Ok(())
    }
}

fn annotation(attributes: &Value, key: &str) -> Option<String> {
    attributes
        .pointer("/annotations/key_value_pair")?
        .as_array()?
        .iter()
        .find(|kv| kv.get("key").and_then(Value::as_str) == Some(key))?
        .get("value")?
        .as_str()
        .map(str::to_string)
}
