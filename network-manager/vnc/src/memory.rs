use crate::ClusterConfig;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use kube_network_manager_core::{ApiError, Create, FqName, VncApi, VncKind, VncObject};
use parking_lot::Mutex;

/// An in-process network controller.
///
/// Objects are validated only as far as the manager relies on: fq-names are
/// unique per kind, updates and deletes require an existing object, and an
/// object cannot be deleted while another object refers to it (unless the
/// reference was relaxed).
#[derive(Debug, Default)]
pub struct MemoryApi {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    objects: HashMap<String, VncObject>,
    by_fq_name: HashMap<(VncKind, FqName), String>,
    relaxed: HashSet<(String, String)>,
    calls: HashMap<&'static str, usize>,
    failures: usize,
}

impl MemoryApi {
    /// A controller holding the objects that clusters expect to have been
    /// provisioned out-of-band: the domain, the ip-fabric network and the
    /// global vrouter configuration.
    pub fn with_cluster_defaults(config: &ClusterConfig) -> Self {
        let api = Self::default();
        api.seed(VncObject::new(VncKind::Domain, config.domain_fq_name()));
        api.seed(VncObject::new(
            VncKind::VirtualNetwork,
            config.ip_fabric_network.clone(),
        ));
        api.seed(VncObject::new(
            VncKind::GlobalVrouterConfig,
            FqName::new([
                "default-global-system-config",
                "default-global-vrouter-config",
            ]),
        ));
        api
    }

    /// Stores an object as if it had been provisioned out-of-band, assigning
    /// a uuid if it has none.
    pub fn seed(&self, mut obj: VncObject) -> VncObject {
        let mut state = self.state.lock();
        if obj.uuid.is_none() {
            obj.uuid = Some(uuid::Uuid::new_v4().to_string());
        }
        state.insert(obj.clone());
        obj
    }

    /// Fails the next `n` requests with a connection error.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures = n;
    }

    /// The number of requests made of the given operation, e.g. `create`.
    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().calls.get(op).copied().unwrap_or(0)
    }

    /// A snapshot of all objects of a kind.
    pub fn objects(&self, kind: VncKind) -> Vec<VncObject> {
        let mut objects = self
            .state
            .lock()
            .objects
            .values()
            .filter(|o| o.kind == kind)
            .cloned()
            .collect::<Vec<_>>();
        objects.sort_by(|a, b| a.fq_name.cmp(&b.fq_name));
        objects
    }

    pub fn is_relaxed(&self, uuid: &str, ref_uuid: &str) -> bool {
        self.state
            .lock()
            .relaxed
            .contains(&(uuid.to_string(), ref_uuid.to_string()))
    }

    fn begin(&self, op: &'static str) -> Result<parking_lot::MutexGuard<'_, State>, ApiError> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_default() += 1;
        if state.failures > 0 {
            state.failures -= 1;
            return Err(ApiError::Connection("injected failure".to_string()));
        }
        Ok(state)
    }
}

#[async_trait::async_trait]
impl VncApi for MemoryApi {
    async fn read(&self, kind: VncKind, fq_name: &FqName) -> Result<VncObject, ApiError> {
        let state = self.begin("read")?;
        state
            .by_fq_name
            .get(&(kind, fq_name.clone()))
            .and_then(|uuid| state.objects.get(uuid))
            .cloned()
            .ok_or_else(|| ApiError::not_found(kind, fq_name))
    }

    async fn read_by_uuid(&self, kind: VncKind, uuid: &str) -> Result<VncObject, ApiError> {
        let state = self.begin("read")?;
        state
            .objects
            .get(uuid)
            .filter(|o| o.kind == kind)
            .cloned()
            .ok_or_else(|| ApiError::not_found(kind, uuid))
    }

    async fn create(&self, mut obj: VncObject) -> Result<Create, ApiError> {
        let mut state = self.begin("create")?;
        if let Some(existing) = state
            .by_fq_name
            .get(&(obj.kind, obj.fq_name.clone()))
            .and_then(|uuid| state.objects.get(uuid))
        {
            return Ok(Create::AlreadyExists(existing.clone()));
        }
        obj.uuid = Some(uuid::Uuid::new_v4().to_string());
        state.insert(obj.clone());
        Ok(Create::Created(obj))
    }

    async fn update(&self, obj: &VncObject) -> Result<(), ApiError> {
        let mut state = self.begin("update")?;
        let uuid = match obj.uuid() {
            Some(uuid) => uuid.to_string(),
            None => state
                .by_fq_name
                .get(&(obj.kind, obj.fq_name.clone()))
                .cloned()
                .ok_or_else(|| ApiError::not_found(obj.kind, &obj.fq_name))?,
        };
        let stored = state
            .objects
            .get_mut(&uuid)
            .ok_or_else(|| ApiError::not_found(obj.kind, &uuid))?;
        stored.attributes = obj.attributes.clone();
        stored.refs = obj.refs.clone();
        Ok(())
    }

    async fn delete(&self, kind: VncKind, uuid: &str) -> Result<(), ApiError> {
        let mut state = self.begin("delete")?;
        if !state.objects.get(uuid).is_some_and(|o| o.kind == kind) {
            return Err(ApiError::not_found(kind, uuid));
        }
        let blocked = state.objects.values().any(|o| {
            o.refs.iter().any(|r| r.uuid == uuid)
                && o.uuid().is_some_and(|from| {
                    !state
                        .relaxed
                        .contains(&(from.to_string(), uuid.to_string()))
                })
        });
        if blocked {
            return Err(ApiError::RefsExist {
                kind,
                uuid: uuid.to_string(),
            });
        }
        if let Some(obj) = state.objects.remove(uuid) {
            state.by_fq_name.remove(&(obj.kind, obj.fq_name));
        }
        Ok(())
    }

    async fn list(&self, kind: VncKind) -> Result<Vec<VncObject>, ApiError> {
        drop(self.begin("list")?);
        Ok(self.objects(kind))
    }

    async fn ping(&self) -> Result<(), ApiError> {
        drop(self.begin("ping")?);
        Ok(())
    }

    async fn ref_relax_for_delete(&self, uuid: &str, ref_uuid: &str) -> Result<(), ApiError> {
        let mut state = self.begin("ref_relax_for_delete")?;
        state
            .relaxed
            .insert((uuid.to_string(), ref_uuid.to_string()));
        Ok(())
    }
}

impl State {
    fn insert(&mut self, obj: VncObject) {
        let Some(uuid) = obj.uuid.clone() else {
            return;
        };
        self.by_fq_name
            .insert((obj.kind, obj.fq_name.clone()), uuid.clone());
        self.objects.insert(uuid, obj);
    }
}
