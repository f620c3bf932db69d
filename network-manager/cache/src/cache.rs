use ahash::AHashMap as HashMap;
use kube_network_manager_core::{FqName, VncKind, VncObject};
use parking_lot::RwLock;
use serde_json::Value;
use std::{collections::BTreeSet, fmt, hash::Hash, sync::Arc};

pub trait CacheKind: Copy + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

impl<K> CacheKind for K where K: Copy + Eq + Hash + Ord + fmt::Debug + Send + Sync + 'static {}

/// A uuid-keyed mirror of objects, partitioned by kind.
///
/// Each partition is guarded by its own lock, and each object by another, so
/// that a reader never observes a partially written object and writers of
/// different kinds never contend.
#[derive(Debug)]
pub struct Cache<K> {
    partitions: Arc<RwLock<HashMap<K, Arc<Partition<K>>>>>,
}

#[derive(Debug)]
struct Partition<K> {
    objects: RwLock<HashMap<String, Arc<Cached<K>>>>,
}

/// A cached object. The uuid and kind never change; the state is replaced in
/// place on update so that handles held elsewhere stay valid.
#[derive(Debug)]
pub struct Cached<K> {
    uuid: String,
    kind: K,
    state: RwLock<State<K>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct State<K> {
    pub fq_name: FqName,
    pub attributes: Value,
    pub refs: BTreeSet<(String, K)>,
}

// === impl Cache ===

impl<K> Default for Cache<K> {
    fn default() -> Self {
        Self {
            partitions: Default::default(),
        }
    }
}

impl<K> Clone for Cache<K> {
    fn clone(&self) -> Self {
        Self {
            partitions: self.partitions.clone(),
        }
    }
}

impl<K: CacheKind> Cache<K> {
    /// Returns the object with the given uuid, creating it (from `seed`, if
    /// provided) when it is not yet cached.
    pub fn locate(&self, kind: K, uuid: &str, seed: Option<State<K>>) -> Arc<Cached<K>> {
        let partition = self.partition(kind);
        if let Some(obj) = partition.objects.read().get(uuid) {
            return obj.clone();
        }

        let obj = partition
            .objects
            .write()
            .entry(uuid.to_string())
            .or_insert_with(|| {
                tracing::trace!(?kind, %uuid, "Caching");
                Arc::new(Cached {
                    uuid: uuid.to_string(),
                    kind,
                    state: RwLock::new(seed.unwrap_or_default()),
                })
            })
            .clone();
        obj
    }

    pub fn get(&self, kind: K, uuid: &str) -> Option<Arc<Cached<K>>> {
        self.existing(kind)?.objects.read().get(uuid).cloned()
    }

    /// Replaces the state of a cached object in place.
    ///
    /// Returns `None` if the object is not cached.
    pub fn update(&self, kind: K, uuid: &str, state: State<K>) -> Option<Arc<Cached<K>>> {
        let obj = self.get(kind, uuid)?;
        *obj.state.write() = state;
        Some(obj)
    }

    /// Removes an object. Removing an object that is not cached is a no-op.
    pub fn delete(&self, kind: K, uuid: &str) -> Option<Arc<Cached<K>>> {
        self.existing(kind)?.objects.write().remove(uuid)
    }

    /// Drops every cached object of every kind.
    pub fn reset(&self) {
        for partition in self.partitions.read().values() {
            partition.objects.write().clear();
        }
    }

    /// Returns all cached objects of a kind, in no particular order.
    pub fn list(&self, kind: K) -> Vec<Arc<Cached<K>>> {
        self.existing(kind)
            .map(|p| p.objects.read().values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn find_by_fq_name(&self, kind: K, fq_name: &FqName) -> Option<Arc<Cached<K>>> {
        self.existing(kind)?
            .objects
            .read()
            .values()
            .find(|obj| obj.state.read().fq_name == *fq_name)
            .cloned()
    }

    pub fn len(&self, kind: K) -> usize {
        self.existing(kind)
            .map(|p| p.objects.read().len())
            .unwrap_or(0)
    }

    pub fn kinds(&self) -> Vec<K> {
        let mut kinds = self.partitions.read().keys().copied().collect::<Vec<_>>();
        kinds.sort();
        kinds
    }

    fn existing(&self, kind: K) -> Option<Arc<Partition<K>>> {
        self.partitions.read().get(&kind).cloned()
    }

    fn partition(&self, kind: K) -> Arc<Partition<K>> {
        if let Some(p) = self.existing(kind) {
            return p;
        }
        self.partitions
            .write()
            .entry(kind)
            .or_insert_with(|| {
                Arc::new(Partition {
                    objects: Default::default(),
                })
            })
            .clone()
    }
}

impl Cache<VncKind> {
    /// Caches a controller object, creating or refreshing its entry.
    pub fn apply(&self, obj: &VncObject) -> Option<Arc<Cached<VncKind>>> {
        let uuid = obj.uuid()?;
        let state = State::from(obj);
        let cached = self.locate(obj.kind, uuid, Some(state.clone()));
        *cached.state.write() = state;
        Some(cached)
    }
}

// === impl Cached ===

impl<K: Clone> Cached<K> {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn kind(&self) -> K {
        self.kind.clone()
    }

    /// A consistent snapshot of the object's state.
    pub fn state(&self) -> State<K> {
        self.state.read().clone()
    }

    pub fn fq_name(&self) -> FqName {
        self.state.read().fq_name.clone()
    }

    pub fn attributes(&self) -> Value {
        self.state.read().attributes.clone()
    }

    /// Reads a single attribute by JSON pointer, e.g. `/metadata/labels`.
    pub fn pointer(&self, pointer: &str) -> Option<Value> {
        self.state.read().attributes.pointer(pointer).cloned()
    }
}

// === impl State ===

impl<K> Default for State<K> {
    fn default() -> Self {
        Self {
            fq_name: FqName::default(),
            attributes: Value::Null,
            refs: BTreeSet::new(),
        }
    }
}

impl<K> State<K> {
    pub fn new(fq_name: FqName, attributes: Value) -> Self {
        Self {
            fq_name,
            attributes,
            refs: BTreeSet::new(),
        }
    }
}

impl From<&VncObject> for State<VncKind> {
    fn from(obj: &VncObject) -> Self {
        Self {
            fq_name: obj.fq_name.clone(),
            attributes: Value::Object(obj.attributes.clone()),
            refs: obj
                .refs
                .iter()
                .map(|r| (r.uuid.clone(), r.kind))
                .collect(),
        }
    }
}
