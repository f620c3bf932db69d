//! The network controller's object model, as far as the manager needs it.
//!
//! Objects are addressed either by uuid or by fully-qualified name. Their
//! properties are kept as an opaque JSON map so that the manager does not have
//! to track the controller's full schema.

use crate::FqName;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fmt, sync::Arc};

/// Object types exposed by the network controller.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VncKind {
    Domain,
    Project,
    NetworkIpam,
    VirtualNetwork,
    NetworkPolicy,
    SecurityGroup,
    Tag,
    ApplicationPolicySet,
    FirewallPolicy,
    FirewallRule,
    GlobalSystemConfig,
    GlobalVrouterConfig,
}

/// A reference from one controller object to another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjRef {
    pub kind: VncKind,
    pub uuid: String,
    pub to: FqName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<Value>,
}

/// A network controller object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VncObject {
    pub kind: VncKind,

    /// Assigned by the controller on creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,

    pub fq_name: FqName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_type: Option<VncKind>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub refs: Vec<ObjRef>,
}

/// The outcome of a create request.
#[derive(Clone, Debug, PartialEq)]
pub enum Create {
    /// The object did not exist and was created.
    Created(VncObject),
    /// An object with the same fq-name already exists; it is returned as-is.
    AlreadyExists(VncObject),
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{kind} {name} not found")]
    NotFound { kind: VncKind, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: VncKind, name: String },

    #[error("{kind} {uuid} is still referenced")]
    RefsExist { kind: VncKind, uuid: String },

    #[error("connection to the controller failed: {0}")]
    Connection(String),

    #[error("controller responded with {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid controller response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// CRUD access to the network controller.
///
/// Implementations must report a missing object as [`ApiError::NotFound`] and
/// resolve create conflicts into [`Create::AlreadyExists`]; both are used as
/// control flow by provisioning.
#[async_trait::async_trait]
pub trait VncApi: Send + Sync + 'static {
    async fn read(&self, kind: VncKind, fq_name: &FqName) -> Result<VncObject, ApiError>;

    async fn read_by_uuid(&self, kind: VncKind, uuid: &str) -> Result<VncObject, ApiError>;

    async fn create(&self, obj: VncObject) -> Result<Create, ApiError>;

    async fn update(&self, obj: &VncObject) -> Result<(), ApiError>;

    async fn delete(&self, kind: VncKind, uuid: &str) -> Result<(), ApiError>;

    async fn list(&self, kind: VncKind) -> Result<Vec<VncObject>, ApiError>;

    /// Marks the reference from `uuid` to `ref_uuid` as not blocking the
    /// deletion of the referred object.
    async fn ref_relax_for_delete(&self, uuid: &str, ref_uuid: &str) -> Result<(), ApiError>;

    /// Checks that the controller answers requests.
    async fn ping(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Reads an object by fq-name, mapping absence to `None`.
    async fn try_read(
        &self,
        kind: VncKind,
        fq_name: &FqName,
    ) -> Result<Option<VncObject>, ApiError> {
        match self.read(kind, fq_name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }
}

pub type SharedApi = Arc<dyn VncApi>;

// === impl VncKind ===

impl VncKind {
    /// Kinds mirrored into the local object cache on resync.
    pub const CACHED: [VncKind; 9] = [
        Self::Project,
        Self::NetworkIpam,
        Self::VirtualNetwork,
        Self::NetworkPolicy,
        Self::SecurityGroup,
        Self::Tag,
        Self::ApplicationPolicySet,
        Self::FirewallPolicy,
        Self::FirewallRule,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::Project => "project",
            Self::NetworkIpam => "network-ipam",
            Self::VirtualNetwork => "virtual-network",
            Self::NetworkPolicy => "network-policy",
            Self::SecurityGroup => "security-group",
            Self::Tag => "tag",
            Self::ApplicationPolicySet => "application-policy-set",
            Self::FirewallPolicy => "firewall-policy",
            Self::FirewallRule => "firewall-rule",
            Self::GlobalSystemConfig => "global-system-config",
            Self::GlobalVrouterConfig => "global-vrouter-config",
        }
    }

    /// The name of the collection resource, e.g. `virtual-networks`.
    pub fn plural(&self) -> String {
        format!("{}s", self.as_str())
    }
}

impl fmt::Display for VncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl VncObject ===

impl VncObject {
    pub fn new(kind: VncKind, fq_name: FqName) -> Self {
        Self {
            kind,
            uuid: None,
            fq_name,
            parent_type: None,
            attributes: Map::new(),
            refs: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent_type: VncKind) -> Self {
        self.parent_type = Some(parent_type);
        self
    }

    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    pub fn name(&self) -> &str {
        self.fq_name.name()
    }

    /// Sets a property, serializing `value` to JSON.
    pub fn set_attr(&mut self, key: &str, value: impl Serialize) -> Result<(), ApiError> {
        let value = serde_json::to_value(value)?;
        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub fn attr<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Adds a reference, replacing any existing reference to the same object.
    ///
    /// Returns false if an identical reference was already present.
    pub fn add_ref(&mut self, to: &VncObject, attr: Option<Value>) -> bool {
        let Some(uuid) = to.uuid() else {
            return false;
        };
        let r = ObjRef {
            kind: to.kind,
            uuid: uuid.to_string(),
            to: to.fq_name.clone(),
            attr,
        };
        match self
            .refs
            .iter_mut()
            .find(|existing| existing.kind == r.kind && existing.uuid == r.uuid)
        {
            Some(existing) if *existing == r => false,
            Some(existing) => {
                *existing = r;
                true
            }
            None => {
                self.refs.push(r);
                true
            }
        }
    }

    pub fn has_ref(&self, kind: VncKind, to: &FqName) -> bool {
        self.refs.iter().any(|r| r.kind == kind && r.to == *to)
    }

    pub fn refs_of(&self, kind: VncKind) -> impl Iterator<Item = &ObjRef> + '_ {
        self.refs.iter().filter(move |r| r.kind == kind)
    }
}

// === impl ApiError ===

impl ApiError {
    pub fn not_found(kind: VncKind, name: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors that indicate the controller is unreachable or overloaded rather
    /// than that the request itself was wrong.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

// === impl Create ===

impl Create {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }

    pub fn into_object(self) -> VncObject {
        match self {
            Self::Created(obj) | Self::AlreadyExists(obj) => obj,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn with_uuid(kind: VncKind, fq: &[&str], uuid: &str) -> VncObject {
        VncObject {
            uuid: Some(uuid.to_string()),
            ..VncObject::new(kind, FqName::new(fq.iter().copied()))
        }
    }

    #[test]
    fn refs_are_deduplicated_by_target() {
        let mut vn = VncObject::new(
            VncKind::VirtualNetwork,
            FqName::new(["d", "p", "pod-network"]),
        );
        let np = with_uuid(VncKind::NetworkPolicy, &["d", "p", "np"], "np-uuid");

        assert!(vn.add_ref(&np, Some(json!({"sequence": {"major": 0, "minor": 0}}))));
        assert!(!vn.add_ref(&np, Some(json!({"sequence": {"major": 0, "minor": 0}}))));
        assert_eq!(vn.refs.len(), 1);

        assert!(vn.add_ref(&np, None), "changed attrs replace the reference");
        assert_eq!(vn.refs.len(), 1);
        assert!(vn.has_ref(VncKind::NetworkPolicy, &np.fq_name));
    }

    #[test]
    fn refs_require_a_uuid() {
        let mut vn = VncObject::new(VncKind::VirtualNetwork, FqName::new(["d", "p", "vn"]));
        let ipam = VncObject::new(VncKind::NetworkIpam, FqName::new(["d", "p", "ipam"]));
        assert!(!vn.add_ref(&ipam, None));
        assert!(vn.refs.is_empty());
    }

    #[test]
    fn serializes_kinds_in_kebab_case() {
        assert_eq!(
            serde_json::to_value(VncKind::GlobalVrouterConfig).unwrap(),
            json!("global-vrouter-config")
        );
        assert_eq!(VncKind::NetworkIpam.plural(), "network-ipams");
    }

    #[test]
    fn classifies_errors() {
        assert!(ApiError::not_found(VncKind::Domain, "default-domain").is_not_found());
        assert!(ApiError::Connection("refused".into()).is_transient());
        assert!(ApiError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
    }
}
