//! Keeps controller tags in step with the labels that are active in the
//! cluster.
//!
//! A tag `label=<key>:<value>` exists while at least one object carries the
//! label. Label transitions create and delete tags as they happen; the
//! labeled kinds' timers call [`reconcile`] to repair tags whose transition
//! failed.

use crate::{
    cache::Cache,
    core::{ApiError, FqName, SharedApi, VncKind, VncObject},
    vnc::{provision, ClusterConfig},
    Context,
};
use ahash::AHashSet as HashSet;
use std::sync::Arc;

const LABEL_TAG_PREFIX: &str = "label=";

#[derive(Clone)]
struct Tags {
    api: SharedApi,
    cache: Cache<VncKind>,
    config: Arc<ClusterConfig>,
}

/// Subscribes tag management to the context's label cache.
pub fn register(ctx: &Context) {
    let tags = Tags::new(ctx);

    let added = tags.clone();
    ctx.labels.on_add(move |key, value| {
        let tags = added.clone();
        async move {
            if let Err(error) = tags.create(&key, &value).await {
                tracing::error!(%key, %value, %error, "Failed to create tag");
            }
        }
    });

    ctx.labels.on_delete(move |key, value| {
        let tags = tags.clone();
        async move {
            if let Err(error) = tags.delete(&tags.config.tag_fq_name(&key, &value)).await {
                tracing::error!(%key, %value, %error, "Failed to delete tag");
            }
        }
    });
}

/// Creates the tags of active labels that the controller is missing and
/// deletes label tags that no object carries.
pub async fn reconcile(ctx: &Context) -> anyhow::Result<()> {
    let tags = Tags::new(ctx);
    let mut failed = 0usize;

    let mut wanted = HashSet::default();
    for (key, value) in ctx.labels.active_labels() {
        let fq_name = tags.config.tag_fq_name(&key, &value);
        if tags.cache.find_by_fq_name(VncKind::Tag, &fq_name).is_none() {
            tracing::info!(%key, %value, "Restoring missing tag");
            if let Err(error) = tags.create(&key, &value).await {
                tracing::error!(%key, %value, %error, "Failed to create tag");
                failed += 1;
            }
        }
        wanted.insert(fq_name);
    }

    for tag in tags.cache.list(VncKind::Tag) {
        let fq_name = tag.fq_name();
        if !fq_name.name().starts_with(LABEL_TAG_PREFIX) || wanted.contains(&fq_name) {
            continue;
        }
        tracing::info!(name = %fq_name, "Deleting tag of an inactive label");
        if let Err(error) = tags.delete(&fq_name).await {
            tracing::error!(name = %fq_name, %error, "Failed to delete tag");
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("failed to reconcile {failed} tags");
    }
    Ok(())
}

impl Tags {
    fn new(ctx: &Context) -> Self {
        Self {
            api: ctx.api.clone(),
            cache: ctx.vnc_cache.clone(),
            config: ctx.config.clone(),
        }
    }

    async fn create(&self, key: &str, value: &str) -> Result<(), ApiError> {
        let mut tag = VncObject::new(VncKind::Tag, self.config.tag_fq_name(key, value));
        tag.set_attr("tag_type_name", "label")?;
        tag.set_attr("tag_value", format!("{key}:{value}"))?;
        provision::create_or_get(self.api.as_ref(), &self.cache, tag).await?;
        Ok(())
    }

    async fn delete(&self, fq_name: &FqName) -> Result<(), ApiError> {
        provision::delete(self.api.as_ref(), &self.cache, VncKind::Tag, fq_name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::FqName,
        managers::tests::{context, Harness},
    };

    /// Tags other than the cluster's application tag.
    fn tag_names(harness: &Harness) -> Vec<FqName> {
        let application = harness.ctx.config.application_tag_fq_name();
        harness
            .api
            .objects(VncKind::Tag)
            .into_iter()
            .map(|t| t.fq_name)
            .filter(|name| *name != application)
            .collect()
    }

    #[tokio::test]
    async fn tags_follow_active_labels() {
        let harness = context().await;
        let ctx = &harness.ctx;
        register(ctx);

        ctx.labels.add_label("Pod/a", "app", "web").await;
        ctx.labels.add_label("Pod/b", "app", "web").await;
        assert_eq!(tag_names(&harness), vec![FqName::new(["label=app:web"])]);

        ctx.labels.remove_label("Pod/a", "app", "web").await;
        assert_eq!(tag_names(&harness).len(), 1, "the label is still carried");

        ctx.labels.remove_label("Pod/b", "app", "web").await;
        assert!(tag_names(&harness).is_empty());
        assert!(ctx
            .vnc_cache
            .find_by_fq_name(VncKind::Tag, &FqName::new(["label=app:web"]))
            .is_none());
    }

    #[tokio::test]
    async fn failed_tag_changes_are_repaired_by_reconcile() {
        let harness = context().await;
        let ctx = &harness.ctx;
        register(ctx);

        harness.api.fail_next(1);
        ctx.labels.add_label("Pod/a", "app", "web").await;
        assert!(tag_names(&harness).is_empty());
        assert_eq!(ctx.labels.owner_count("app", "web"), 1);

        // Later owners do not re-announce an active label.
        ctx.labels.add_label("Pod/b", "app", "web").await;
        assert!(tag_names(&harness).is_empty());

        reconcile(ctx).await.expect("reconcile must succeed");
        assert_eq!(tag_names(&harness), vec![FqName::new(["label=app:web"])]);

        harness.api.fail_next(1);
        ctx.labels.remove_label("Pod/a", "app", "web").await;
        ctx.labels.remove_label("Pod/b", "app", "web").await;
        assert_eq!(tag_names(&harness).len(), 1, "the delete failed");

        reconcile(ctx).await.expect("reconcile must succeed");
        assert!(tag_names(&harness).is_empty());
    }

    #[tokio::test]
    async fn reconcile_only_deletes_label_tags() {
        let harness = context().await;
        let ctx = &harness.ctx;

        for name in ["label=old:value", "namespace=ns-0"] {
            let tag = harness
                .api
                .seed(VncObject::new(VncKind::Tag, FqName::new([name])));
            ctx.vnc_cache.apply(&tag);
        }
        ctx.labels.add_label("Pod/a", "app", "web").await;

        reconcile(ctx).await.expect("reconcile must succeed");
        let mut names = tag_names(&harness);
        names.sort();
        assert_eq!(
            names,
            vec![
                FqName::new(["label=app:web"]),
                FqName::new(["namespace=ns-0"]),
            ]
        );
        assert!(harness
            .api
            .objects(VncKind::Tag)
            .iter()
            .any(|t| t.fq_name == ctx.config.application_tag_fq_name()));
    }

    #[tokio::test]
    async fn reconcile_reports_failures() {
        let harness = context().await;
        let ctx = &harness.ctx;
        ctx.labels.add_label("Pod/a", "app", "web").await;

        harness.api.fail_next(1);
        assert!(reconcile(ctx).await.is_err());
        assert!(tag_names(&harness).is_empty());

        reconcile(ctx).await.expect("reconcile must succeed");
        assert_eq!(tag_names(&harness), vec![FqName::new(["label=app:web"])]);
    }
}
