use serde_json::Value;
use std::{collections::BTreeMap, fmt, str::FromStr};

/// A Kubernetes resource kind that the manager knows how to reconcile.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    Pod,
    Service,
    NetworkPolicy,
    Ingress,
    Endpoints,
    NetworkAttachmentDefinition,
}

/// Describes what happened to the object carried by an [`Event`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    /// Requests a resync of an entire kind rather than a single object.
    Sync,
}

/// A canonical cluster change, as produced by an event source.
///
/// Events are immutable once queued.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: String,
    pub change: ChangeType,
    pub object: Value,
    pub namespace: Option<String>,
    pub name: String,
    pub uid: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported resource kind: {0}")]
pub struct UnknownKind(pub String);

// === impl ResourceKind ===

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        Self::Namespace,
        Self::Pod,
        Self::Service,
        Self::NetworkPolicy,
        Self::Ingress,
        Self::Endpoints,
        Self::NetworkAttachmentDefinition,
    ];

    /// Kinds that expose a periodic resync hook.
    pub const TIMED: [ResourceKind; 5] = [
        Self::NetworkPolicy,
        Self::Ingress,
        Self::Service,
        Self::Pod,
        Self::Namespace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::Pod => "Pod",
            Self::Service => "Service",
            Self::NetworkPolicy => "NetworkPolicy",
            Self::Ingress => "Ingress",
            Self::Endpoints => "Endpoints",
            Self::NetworkAttachmentDefinition => "NetworkAttachmentDefinition",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

// === impl ChangeType ===

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "ADDED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Sync => "SYNC",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Event ===

impl Event {
    /// Builds an event from an object document, resolving its identity from
    /// the document's `metadata`.
    pub fn new(kind: impl ToString, change: ChangeType, object: Value) -> Self {
        let metadata = object.get("metadata");
        let field = |name: &str| {
            metadata
                .and_then(|m| m.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            kind: kind.to_string(),
            change,
            namespace: field("namespace"),
            name: field("name").unwrap_or_default(),
            uid: field("uid").unwrap_or_default(),
            object,
        }
    }

    /// A synthetic event requesting a resync of all objects of `kind`.
    pub fn sync(kind: ResourceKind) -> Self {
        Self {
            kind: kind.to_string(),
            change: ChangeType::Sync,
            object: Value::Null,
            namespace: None,
            name: String::new(),
            uid: String::new(),
        }
    }

    pub fn resource_kind(&self) -> Result<ResourceKind, UnknownKind> {
        self.kind.parse()
    }

    /// Returns the labels carried by the event's object.
    pub fn labels(&self) -> BTreeMap<String, String> {
        labels_of(&self.object)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}:{}:{}",
            self.change,
            self.kind,
            self.namespace.as_deref().unwrap_or(""),
            self.name,
            self.uid
        )
    }
}

/// Reads `metadata.labels` from an object document.
pub fn labels_of(object: &Value) -> BTreeMap<String, String> {
    object
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    #[test]
    fn resolves_identity_from_metadata() {
        let ev = Event::new(
            "Pod",
            ChangeType::Added,
            json!({
                "metadata": {
                    "namespace": "ns-0",
                    "name": "pod-0",
                    "uid": "1234",
                    "labels": { "app": "web", "tier": "front" },
                },
            }),
        );
        assert_eq!(ev.namespace.as_deref(), Some("ns-0"));
        assert_eq!(ev.name, "pod-0");
        assert_eq!(ev.uid, "1234");
        assert_eq!(ev.resource_kind(), Ok(ResourceKind::Pod));
        assert_eq!(
            ev.labels(),
            btreemap! {
                "app".to_string() => "web".to_string(),
                "tier".to_string() => "front".to_string(),
            }
        );
    }

    #[test]
    fn unsupported_kinds_do_not_parse() {
        let ev = Event::new("Unsupported", ChangeType::Modified, json!({}));
        assert_eq!(
            ev.resource_kind(),
            Err(UnknownKind("Unsupported".to_string()))
        );
        assert_eq!(ev.name, "");
    }

    #[test]
    fn sync_events_carry_no_object() {
        let ev = Event::sync(ResourceKind::Namespace);
        assert_eq!(ev.change, ChangeType::Sync);
        assert_eq!(ev.kind, "Namespace");
        assert!(ev.object.is_null());
    }
}
