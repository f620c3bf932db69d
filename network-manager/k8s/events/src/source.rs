use crate::queue::{Closed, EventTx};
use ahash::AHashSet as HashSet;
use futures::prelude::*;
use kube_network_manager_cache::{Cache, State};
use kube_network_manager_core::{ChangeType, Event, FqName, ResourceKind};
use kube_network_manager_k8s_api::{watcher, ResourceExt, Watched};
use std::marker::PhantomData;

/// Normalizes a kind's watch notifications into canonical events.
///
/// The source mirrors every object it observes into its kind's partition of
/// the Kubernetes object cache, and uses that partition to tell additions from
/// modifications and to detect deletions missed while a watch was restarting.
#[derive(Debug)]
pub struct EventSource<T> {
    queue: EventTx,
    cache: Cache<ResourceKind>,

    /// Uids observed since the last watch (re)initialization, while one is in
    /// progress.
    relisted: Option<HashSet<String>>,

    _kind: PhantomData<fn(T)>,
}

impl<T: Watched> EventSource<T> {
    /// Creates a source that mirrors objects into a private cache.
    pub fn new(queue: EventTx) -> Self {
        Self {
            queue,
            cache: Cache::default(),
            relisted: None,
            _kind: PhantomData,
        }
    }

    /// Mirrors objects into a shared cache. The source becomes the only writer
    /// of its kind's partition.
    pub fn with_cache(mut self, cache: Cache<ResourceKind>) -> Self {
        self.cache = cache;
        self
    }

    /// Processes watch events until the watch ends or the queue is closed.
    pub async fn run(mut self, events: impl Stream<Item = watcher::Event<T>>) {
        tokio::pin!(events);
        while let Some(ev) = events.next().await {
            if self.handle(ev).is_err() {
                tracing::info!("Event queue closed");
                return;
            }
        }
        tracing::info!("Watch terminated");
    }

    pub fn handle(&mut self, ev: watcher::Event<T>) -> Result<(), Closed> {
        match ev {
            watcher::Event::Init => {
                tracing::debug!(kind = %T::KIND, "Relisting");
                self.relisted = Some(HashSet::default());
                Ok(())
            }
            watcher::Event::InitApply(obj) => {
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(uid_of(&obj));
                }
                self.apply(obj)
            }
            watcher::Event::InitDone => self.relisted(),
            watcher::Event::Apply(obj) => self.apply(obj),
            watcher::Event::Delete(obj) => self.delete(obj),
        }
    }

    fn apply(&mut self, obj: T) -> Result<(), Closed> {
        let uid = uid_of(&obj);
        let document = match serde_json::to_value(&obj) {
            Ok(document) => document,
            Err(error) => {
                encode_failed::<T>(&obj, &error);
                return Ok(());
            }
        };
        let state = State::new(fq_name_of(&obj), document.clone());

        let change = match self.cache.update(T::KIND, &uid, state.clone()) {
            Some(_) => ChangeType::Modified,
            None => {
                self.cache.locate(T::KIND, &uid, Some(state));
                ChangeType::Added
            }
        };

        self.publish(Event::new(T::KIND, change, document))
    }

    fn delete(&mut self, obj: T) -> Result<(), Closed> {
        let uid = uid_of(&obj);
        self.cache.delete(T::KIND, &uid);
        match serde_json::to_value(&obj) {
            Ok(document) => self.publish(Event::new(T::KIND, ChangeType::Deleted, document)),
            Err(error) => {
                encode_failed::<T>(&obj, &error);
                Ok(())
            }
        }
    }

    /// Completes a relist: objects that were cached before the relist but were
    /// not observed during it have been deleted in the meantime.
    fn relisted(&mut self) -> Result<(), Closed> {
        let Some(relisted) = self.relisted.take() else {
            return Ok(());
        };

        for stale in self.cache.list(T::KIND) {
            if relisted.contains(stale.uuid()) {
                continue;
            }
            let document = stale.attributes();
            self.cache.delete(T::KIND, stale.uuid());
            self.publish(Event::new(T::KIND, ChangeType::Deleted, document))?;
        }

        self.publish(Event::sync(T::KIND))
    }

    fn publish(&self, event: Event) -> Result<(), Closed> {
        tracing::debug!(%event, "Got");
        self.queue.send(event)
    }
}

fn uid_of<T: Watched>(obj: &T) -> String {
    obj.uid().unwrap_or_else(|| match obj.namespace() {
        Some(ns) => format!("{ns}/{}", obj.name_any()),
        None => obj.name_any(),
    })
}

fn encode_failed<T: Watched>(obj: &T, error: &serde_json::Error) {
    tracing::warn!(kind = %T::KIND, name = %obj.name_any(), %error, "Failed to encode object");
}

fn fq_name_of<T: Watched>(obj: &T) -> FqName {
    match obj.namespace() {
        Some(ns) => FqName::new([ns, obj.name_any()]),
        None => FqName::new([obj.name_any()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{channel, Dequeue, EventRx};
    use kube_network_manager_k8s_api::{Namespace, ObjectMeta, Pod};

    fn pod(name: &str, uid: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                namespace: Some("ns-0".to_string()),
                name: Some(name.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    async fn drain(rx: &mut EventRx) -> Vec<(ChangeType, String, String)> {
        let mut events = Vec::new();
        while let Dequeue::Item(env) = rx.dequeue(Some(tokio::time::Duration::ZERO)).await {
            events.push((env.event.change, env.event.kind, env.event.name));
        }
        events
    }

    fn ev(change: ChangeType, kind: &str, name: &str) -> (ChangeType, String, String) {
        (change, kind.to_string(), name.to_string())
    }

    #[tokio::test]
    async fn distinguishes_additions_from_modifications() {
        let (tx, mut rx) = channel();
        let cache = Cache::default();
        let mut source = EventSource::<Pod>::new(tx).with_cache(cache.clone());

        source.handle(watcher::Event::Apply(pod("pod-0", "u0"))).unwrap();
        source.handle(watcher::Event::Apply(pod("pod-0", "u0"))).unwrap();
        source.handle(watcher::Event::Delete(pod("pod-0", "u0"))).unwrap();

        assert_eq!(
            drain(&mut rx).await,
            vec![
                ev(ChangeType::Added, "Pod", "pod-0"),
                ev(ChangeType::Modified, "Pod", "pod-0"),
                ev(ChangeType::Deleted, "Pod", "pod-0"),
            ]
        );
        assert!(cache.get(ResourceKind::Pod, "u0").is_none());
    }

    #[tokio::test]
    async fn mirrors_objects_into_the_cache() {
        let (tx, _rx) = channel();
        let cache = Cache::default();
        let mut source = EventSource::<Pod>::new(tx).with_cache(cache.clone());

        source.handle(watcher::Event::Apply(pod("pod-0", "u0"))).unwrap();
        let cached = cache.get(ResourceKind::Pod, "u0").expect("pod must be cached");
        assert_eq!(cached.fq_name(), FqName::new(["ns-0", "pod-0"]));
        assert_eq!(
            cached.pointer("/metadata/name"),
            Some(serde_json::json!("pod-0"))
        );
    }

    #[tokio::test]
    async fn relist_deletes_unobserved_objects_and_requests_a_sync() {
        let (tx, mut rx) = channel();
        let mut source = EventSource::<Pod>::new(tx);

        source.handle(watcher::Event::Apply(pod("pod-0", "u0"))).unwrap();
        source.handle(watcher::Event::Apply(pod("pod-1", "u1"))).unwrap();
        drain(&mut rx).await;

        source.handle(watcher::Event::Init).unwrap();
        source.handle(watcher::Event::InitApply(pod("pod-1", "u1"))).unwrap();
        source.handle(watcher::Event::InitApply(pod("pod-2", "u2"))).unwrap();
        source.handle(watcher::Event::InitDone).unwrap();

        assert_eq!(
            drain(&mut rx).await,
            vec![
                ev(ChangeType::Modified, "Pod", "pod-1"),
                ev(ChangeType::Added, "Pod", "pod-2"),
                ev(ChangeType::Deleted, "Pod", "pod-0"),
                ev(ChangeType::Sync, "Pod", ""),
            ]
        );
    }

    #[tokio::test]
    async fn cluster_scoped_objects_are_named_without_namespace() {
        let (tx, mut rx) = channel();
        let cache = Cache::default();
        let mut source = EventSource::<Namespace>::new(tx).with_cache(cache.clone());
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("kube-system".to_string()),
                uid: Some("ns-uid".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        source.handle(watcher::Event::Apply(ns)).unwrap();

        let cached = cache.get(ResourceKind::Namespace, "ns-uid").unwrap();
        assert_eq!(cached.fq_name(), FqName::new(["kube-system"]));
        assert_eq!(
            drain(&mut rx).await,
            vec![ev(ChangeType::Added, "Namespace", "kube-system")]
        );
    }

    #[tokio::test]
    async fn fails_once_the_queue_is_closed() {
        let (tx, rx) = channel();
        drop(rx);
        let mut source = EventSource::<Pod>::new(tx);
        assert_eq!(
            source.handle(watcher::Event::Apply(pod("pod-0", "u0"))),
            Err(Closed)
        );
    }
}
