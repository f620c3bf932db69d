//! Label bookkeeping.
//!
//! Tracks the set of owners carrying each `(key, value)` label. Subscribers are
//! notified once when a label gains its first owner and once when it loses its
//! last owner, regardless of how many objects carry it in between.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use std::{collections::BTreeMap, future::Future, sync::Arc};

pub type Callback = Arc<dyn Fn(String, String) -> BoxFuture<'static, ()> + Send + Sync>;

pub type Label = (String, String);

#[derive(Clone, Default)]
pub struct LabelCache {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<Associations>,
    on_add: RwLock<Vec<Callback>>,
    on_delete: RwLock<Vec<Callback>>,
}

#[derive(Default)]
struct Associations {
    owners: HashMap<Label, HashSet<String>>,
    by_owner: HashMap<String, BTreeMap<String, String>>,
}

/// Label transitions that must be announced to subscribers.
#[derive(Default)]
struct Transitions {
    added: Vec<Label>,
    removed: Vec<Label>,
}

// === impl LabelCache ===

impl LabelCache {
    /// Registers a callback invoked when a label becomes active.
    pub fn on_add<F, Fut>(&self, f: F)
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.on_add.write().push(boxed(f));
    }

    /// Registers a callback invoked when a label is no longer carried by any
    /// owner.
    pub fn on_delete<F, Fut>(&self, f: F)
    where
        F: Fn(String, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.on_delete.write().push(boxed(f));
    }

    /// Associates a label with an owner.
    ///
    /// Returns true if this made the label active.
    pub async fn add_label(&self, owner: &str, key: &str, value: &str) -> bool {
        let mut tx = Transitions::default();
        {
            let mut state = self.inner.state.lock();
            let replaced = state
                .by_owner
                .entry(owner.to_string())
                .or_default()
                .insert(key.to_string(), value.to_string());
            // An owner carries at most one value per key.
            if let Some(old) = replaced.filter(|old| old != value) {
                state.remove(owner, key, &old, &mut tx);
            }
            state.insert(owner, key, value, &mut tx);
        }
        let activated = !tx.added.is_empty();
        self.notify(tx).await;
        activated
    }

    /// Dissociates a label from an owner.
    ///
    /// Returns true if this made the label inactive.
    pub async fn remove_label(&self, owner: &str, key: &str, value: &str) -> bool {
        let mut tx = Transitions::default();
        {
            let mut state = self.inner.state.lock();
            if let Some(labels) = state.by_owner.get_mut(owner) {
                if labels.get(key).map(String::as_str) == Some(value) {
                    labels.remove(key);
                }
                if labels.is_empty() {
                    state.by_owner.remove(owner);
                }
            }
            state.remove(owner, key, value, &mut tx);
        }
        let deactivated = !tx.removed.is_empty();
        self.notify(tx).await;
        deactivated
    }

    /// Replaces the full set of labels carried by an owner.
    pub async fn set_labels(&self, owner: &str, labels: BTreeMap<String, String>) {
        let mut tx = Transitions::default();
        {
            let mut state = self.inner.state.lock();
            let previous = if labels.is_empty() {
                state.by_owner.remove(owner)
            } else {
                state.by_owner.insert(owner.to_string(), labels.clone())
            }
            .unwrap_or_default();

            for (k, v) in &previous {
                if labels.get(k) != Some(v) {
                    state.remove(owner, k, v, &mut tx);
                }
            }
            for (k, v) in &labels {
                if previous.get(k) != Some(v) {
                    state.insert(owner, k, v, &mut tx);
                }
            }
        }
        self.notify(tx).await;
    }

    /// Drops every label carried by an owner.
    pub async fn clear_owner(&self, owner: &str) {
        self.set_labels(owner, BTreeMap::new()).await
    }

    pub fn labels_of(&self, owner: &str) -> BTreeMap<String, String> {
        self.inner
            .state
            .lock()
            .by_owner
            .get(owner)
            .cloned()
            .unwrap_or_default()
    }

    /// Lists owners whose identity starts with `prefix`.
    pub fn owners_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.inner
            .state
            .lock()
            .by_owner
            .keys()
            .filter(|o| o.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn owner_count(&self, key: &str, value: &str) -> usize {
        self.inner
            .state
            .lock()
            .owners
            .get(&(key.to_string(), value.to_string()))
            .map(|owners| owners.len())
            .unwrap_or(0)
    }

    /// Lists every label carried by at least one owner.
    pub fn active_labels(&self) -> Vec<Label> {
        let mut labels = self
            .inner
            .state
            .lock()
            .owners
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        labels.sort();
        labels
    }

    async fn notify(&self, tx: Transitions) {
        if tx.added.is_empty() && tx.removed.is_empty() {
            return;
        }

        // Snapshot the subscribers so that no lock is held across callbacks.
        let on_add = self.inner.on_add.read().clone();
        let on_delete = self.inner.on_delete.read().clone();

        for (key, value) in tx.removed {
            tracing::debug!(%key, %value, "Label deactivated");
            for cb in &on_delete {
                cb(key.clone(), value.clone()).await;
            }
        }
        for (key, value) in tx.added {
            tracing::debug!(%key, %value, "Label activated");
            for cb in &on_add {
                cb(key.clone(), value.clone()).await;
            }
        }
    }
}

impl std::fmt::Debug for LabelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelCache")
            .field("labels", &self.inner.state.lock().owners.len())
            .finish()
    }
}

// === impl Associations ===

impl Associations {
    fn insert(&mut self, owner: &str, key: &str, value: &str, tx: &mut Transitions) {
        let label = (key.to_string(), value.to_string());
        let owners = self.owners.entry(label.clone()).or_default();
        let first = owners.is_empty();
        if owners.insert(owner.to_string()) && first {
            tx.added.push(label);
        }
    }

    fn remove(&mut self, owner: &str, key: &str, value: &str, tx: &mut Transitions) {
        let label = (key.to_string(), value.to_string());
        if let Some(owners) = self.owners.get_mut(&label) {
            if owners.remove(owner) && owners.is_empty() {
                self.owners.remove(&label);
                tx.removed.push(label);
            }
        }
    }
}

fn boxed<F, Fut>(f: F) -> Callback
where
    F: Fn(String, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |k, v| -> BoxFuture<'static, ()> { Box::pin(f(k, v)) })
}
