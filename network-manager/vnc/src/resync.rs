//! Seeds the controller object cache from the controller.

use kube_network_manager_cache::{Cache, State};
use kube_network_manager_core::{ApiError, VncApi, VncKind};

/// Loads every object of the cached kinds into `cache`.
///
/// Objects already cached keep their state; only missing objects are added.
/// Returns the number of objects listed.
pub async fn full(api: &dyn VncApi, cache: &Cache<VncKind>) -> Result<usize, ApiError> {
    let mut total = 0;
    for kind in VncKind::CACHED {
        let objects = api.list(kind).await?;
        tracing::debug!(%kind, objects = objects.len(), "Listed");
        for obj in &objects {
            if let Some(uuid) = obj.uuid() {
                cache.locate(kind, uuid, Some(State::from(obj)));
                total += 1;
            }
        }
    }
    tracing::info!(objects = total, "Resynced controller objects");
    Ok(total)
}

/// Forgets all cached controller objects, e.g. before resyncing after a
/// reconnect.
pub fn reset(cache: &Cache<VncKind>) {
    cache.reset();
    tracing::debug!("Reset controller object cache");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryApi;
    use kube_network_manager_core::{FqName, VncObject};
    use serde_json::json;

    fn project(name: &str) -> VncObject {
        VncObject::new(VncKind::Project, FqName::new(["default-domain", name]))
    }

    #[tokio::test]
    async fn loads_cached_kinds() {
        let api = MemoryApi::default();
        let p = api.seed(project("p"));
        api.seed(VncObject::new(
            VncKind::VirtualNetwork,
            FqName::new(["default-domain", "p", "vn"]),
        ));
        api.seed(VncObject::new(VncKind::Domain, FqName::new(["default-domain"])));

        let cache = Cache::default();
        assert_eq!(full(&api, &cache).await.unwrap(), 2);
        assert_eq!(cache.len(VncKind::Project), 1);
        assert_eq!(cache.len(VncKind::VirtualNetwork), 1);
        assert_eq!(cache.len(VncKind::Domain), 0, "domains are not cached");
        let cached = cache.get(VncKind::Project, p.uuid().unwrap()).unwrap();
        assert_eq!(cached.fq_name(), p.fq_name);
    }

    #[tokio::test]
    async fn does_not_overwrite_cached_state() {
        let api = MemoryApi::default();
        let mut p = project("p");
        p.set_attr("display_name", "from-controller").unwrap();
        let p = api.seed(p);

        let cache = Cache::default();
        let uuid = p.uuid().unwrap();
        let held = cache.locate(
            VncKind::Project,
            uuid,
            Some(State::new(p.fq_name.clone(), json!({"display_name": "local"}))),
        );
        full(&api, &cache).await.unwrap();
        assert_eq!(held.pointer("/display_name"), Some(json!("local")));

        reset(&cache);
        assert!(cache.get(VncKind::Project, uuid).is_none());
        full(&api, &cache).await.unwrap();
        assert_eq!(
            cache.get(VncKind::Project, uuid).unwrap().pointer("/display_name"),
            Some(json!("from-controller"))
        );
    }

    #[tokio::test]
    async fn fails_when_the_controller_is_unavailable() {
        let api = MemoryApi::default();
        api.fail_next(1);
        assert!(full(&api, &Cache::default()).await.unwrap_err().is_transient());
    }
}
