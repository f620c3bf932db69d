use super::{owner_id, tags, ResourceManager};
use crate::{
    core::{labels_of, ChangeType, Event, ResourceKind},
    Context,
};
use ahash::AHashSet as HashSet;
use anyhow::Result;

/// Publishes the labels of namespaced workloads (pods, services, ingresses)
/// to the label cache, which drives tag management.
#[derive(Debug)]
pub struct LabeledManager {
    ctx: Context,
    kind: ResourceKind,
}

impl LabeledManager {
    pub fn new(ctx: Context, kind: ResourceKind) -> Self {
        Self { ctx, kind }
    }

    /// Objects are only associated with labels once their namespace has been
    /// observed; until then the kind's timer picks them up.
    fn is_deferred(&self, namespace: Option<&str>, name: &str) -> bool {
        match namespace {
            Some(ns) if !self.ctx.namespace_exists(ns) => {
                tracing::info!(
                    kind = %self.kind,
                    namespace = %ns,
                    %name,
                    "Deferring until the namespace is observed"
                );
                true
            }
            _ => false,
        }
    }
}

#[async_trait::async_trait]
impl ResourceManager for LabeledManager {
    async fn process(&self, event: &Event) -> Result<()> {
        let owner = owner_id(self.kind, &event.uid);
        match event.change {
            ChangeType::Added | ChangeType::Modified => {
                if self.is_deferred(event.namespace.as_deref(), &event.name) {
                    return Ok(());
                }
                self.ctx.labels.set_labels(&owner, event.labels()).await;
            }
            ChangeType::Deleted => self.ctx.labels.clear_owner(&owner).await,
            ChangeType::Sync => return self.timer().await,
        }
        Ok(())
    }

    async fn timer(&self) -> Result<()> {
        let mut live = HashSet::default();
        for obj in self.ctx.kube_cache.list(self.kind) {
            let fq_name = obj.fq_name();
            let namespace = fq_name.parent();
            if self.is_deferred(namespace.as_ref().map(|ns| ns.name()), fq_name.name()) {
                continue;
            }
            let owner = owner_id(self.kind, obj.uuid());
            self.ctx
                .labels
                .set_labels(&owner, labels_of(&obj.attributes()))
                .await;
            live.insert(owner);
        }

        let prefix = owner_id(self.kind, "");
        for owner in self.ctx.labels.owners_with_prefix(&prefix) {
            if !live.contains(&owner) {
                tracing::debug!(%owner, "Releasing labels of a vanished object");
                self.ctx.labels.clear_owner(&owner).await;
            }
        }

        tags::reconcile(&self.ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::VncKind,
        managers::tests::{context, event, forget, observe, Harness},
    };
    use maplit::btreemap;

    #[tokio::test]
    async fn pods_own_their_labels() {
        let Harness { ctx, .. } = context().await;
        observe(&ctx, ResourceKind::Namespace, None, "ns-0", btreemap! {});
        let manager = LabeledManager::new(ctx.clone(), ResourceKind::Pod);

        let pod = event(
            ResourceKind::Pod,
            ChangeType::Added,
            Some("ns-0"),
            "web-0",
            btreemap! { "app" => "web" },
        );
        manager.process(&pod).await.unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 1);

        let relabeled = event(
            ResourceKind::Pod,
            ChangeType::Modified,
            Some("ns-0"),
            "web-0",
            btreemap! { "app" => "api" },
        );
        manager.process(&relabeled).await.unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 0);
        assert_eq!(ctx.labels.owner_count("app", "api"), 1);

        manager
            .process(&Event {
                change: ChangeType::Deleted,
                ..relabeled
            })
            .await
            .unwrap();
        assert_eq!(ctx.labels.owner_count("app", "api"), 0);
    }

    #[tokio::test]
    async fn pods_wait_for_their_namespace() {
        let Harness { ctx, .. } = context().await;
        let manager = LabeledManager::new(ctx.clone(), ResourceKind::Pod);

        observe(
            &ctx,
            ResourceKind::Pod,
            Some("late"),
            "web-0",
            btreemap! { "app" => "web" },
        );
        let pod = event(
            ResourceKind::Pod,
            ChangeType::Added,
            Some("late"),
            "web-0",
            btreemap! { "app" => "web" },
        );
        manager.process(&pod).await.unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 0);

        observe(&ctx, ResourceKind::Namespace, None, "late", btreemap! {});
        manager.timer().await.unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 1);
    }

    #[tokio::test]
    async fn timer_releases_vanished_owners() {
        let Harness { ctx, .. } = context().await;
        observe(&ctx, ResourceKind::Namespace, None, "ns-0", btreemap! {});
        let manager = LabeledManager::new(ctx.clone(), ResourceKind::Service);

        observe(
            &ctx,
            ResourceKind::Service,
            Some("ns-0"),
            "svc-0",
            btreemap! { "app" => "web" },
        );
        observe(
            &ctx,
            ResourceKind::Service,
            Some("ns-0"),
            "svc-1",
            btreemap! { "app" => "web" },
        );
        manager.timer().await.unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 2);

        forget(&ctx, ResourceKind::Service, "svc-0");
        manager.timer().await.unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 1);
    }

    #[tokio::test]
    async fn kinds_do_not_release_each_others_labels() {
        let Harness { ctx, .. } = context().await;
        observe(&ctx, ResourceKind::Namespace, None, "ns-0", btreemap! {});
        observe(
            &ctx,
            ResourceKind::Pod,
            Some("ns-0"),
            "web-0",
            btreemap! { "app" => "web" },
        );
        LabeledManager::new(ctx.clone(), ResourceKind::Pod)
            .timer()
            .await
            .unwrap();

        LabeledManager::new(ctx.clone(), ResourceKind::Ingress)
            .timer()
            .await
            .unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 1);
    }

    #[tokio::test]
    async fn timer_restores_tags_lost_to_controller_failures() {
        let Harness { ctx, api } = context().await;
        tags::register(&ctx);
        observe(&ctx, ResourceKind::Namespace, None, "ns-0", btreemap! {});
        let manager = LabeledManager::new(ctx.clone(), ResourceKind::Pod);

        let doc = observe(
            &ctx,
            ResourceKind::Pod,
            Some("ns-0"),
            "web-0",
            btreemap! { "app" => "web" },
        );
        api.fail_next(1);
        manager
            .process(&Event::new(ResourceKind::Pod, ChangeType::Added, doc))
            .await
            .unwrap();
        assert_eq!(ctx.labels.owner_count("app", "web"), 1);
        let tags = || {
            api.objects(VncKind::Tag)
                .into_iter()
                .map(|t| t.fq_name.to_string())
                .collect::<Vec<_>>()
        };
        assert!(!tags().contains(&"label=app:web".to_string()));

        manager.timer().await.unwrap();
        assert!(tags().contains(&"label=app:web".to_string()), "{:?}", tags());
    }
}
