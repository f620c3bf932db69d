use crate::{
    cache::{Cache, LabelCache, State},
    core::{ChangeType, Event, FqName, ResourceKind},
    vnc::{Bootstrap, ClusterConfig, MemoryApi},
    Context,
};
use serde_json::{json, Value};
use std::{collections::BTreeMap, sync::Arc};
use tokio::time;

pub(crate) struct Harness {
    pub ctx: Context,
    pub api: Arc<MemoryApi>,
}

fn config() -> ClusterConfig {
    ClusterConfig {
        pod_subnets: vec!["10.32.0.0/12".parse().unwrap()],
        service_subnets: vec!["10.96.0.0/12".parse().unwrap()],
        ip_fabric_subnets: vec!["10.64.0.0/12".parse().unwrap()],
        ..Default::default()
    }
}

/// A context bootstrapped against an in-memory controller.
pub(crate) async fn context() -> Harness {
    let config = Arc::new(config());
    let api = Arc::new(MemoryApi::with_cluster_defaults(&config));
    let vnc_cache = Cache::default();
    let provisioned = Bootstrap::new(api.clone(), vnc_cache.clone(), config.clone())
        .with_nat_retry(time::Duration::ZERO, 1)
        .run()
        .await
        .expect("bootstrap must succeed");

    let ctx = Context {
        config,
        api: api.clone(),
        vnc_cache,
        kube_cache: Cache::default(),
        labels: LabelCache::default(),
        provisioned: Arc::new(provisioned),
    };
    Harness { ctx, api }
}

pub(crate) fn document(
    namespace: Option<&str>,
    name: &str,
    labels: BTreeMap<&str, &str>,
) -> Value {
    let mut doc = json!({
        "metadata": {
            "name": name,
            "uid": format!("uid-{name}"),
            "labels": labels,
        },
    });
    if let Some(ns) = namespace {
        doc["metadata"]["namespace"] = json!(ns);
    }
    doc
}

pub(crate) fn event(
    kind: ResourceKind,
    change: ChangeType,
    namespace: Option<&str>,
    name: &str,
    labels: BTreeMap<&str, &str>,
) -> Event {
    Event::new(kind, change, document(namespace, name, labels))
}

/// Caches an object as its event source would.
pub(crate) fn observe(
    ctx: &Context,
    kind: ResourceKind,
    namespace: Option<&str>,
    name: &str,
    labels: BTreeMap<&str, &str>,
) -> Value {
    let doc = document(namespace, name, labels);
    observe_document(ctx, kind, doc.clone());
    doc
}

pub(crate) fn observe_document(ctx: &Context, kind: ResourceKind, doc: Value) {
    let ev = Event::new(kind, ChangeType::Added, doc.clone());
    let fq_name = match ev.namespace.as_deref() {
        Some(ns) => FqName::new([ns, ev.name.as_str()]),
        None => FqName::new([ev.name.as_str()]),
    };
    ctx.kube_cache
        .locate(kind, &ev.uid, Some(State::new(fq_name, doc)));
}

pub(crate) fn forget(ctx: &Context, kind: ResourceKind, name: &str) {
    ctx.kube_cache.delete(kind, &format!("uid-{name}"));
}
