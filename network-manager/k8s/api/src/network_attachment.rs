use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Describes a secondary network that pods may attach to.
///
/// The `config` field holds the CNI configuration as an opaque JSON string.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachmentDefinitionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
}

impl NetworkAttachmentDefinitionSpec {
    /// Parses the CNI configuration, if any.
    pub fn cni_config(&self) -> serde_json::Result<Option<serde_json::Value>> {
        self.config.as_deref().map(serde_json::from_str).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn parses_cni_config() {
        let spec = NetworkAttachmentDefinitionSpec {
            config: Some(r#"{"cniVersion":"0.3.1","type":"contrail-k8s-cni"}"#.to_string()),
        };
        let config = spec
            .cni_config()
            .expect("config must parse")
            .expect("config must be set");
        assert_eq!(config["type"], "contrail-k8s-cni");

        let invalid = NetworkAttachmentDefinitionSpec {
            config: Some("{".to_string()),
        };
        assert!(invalid.cni_config().is_err());

        let unset = NetworkAttachmentDefinitionSpec::default();
        assert!(unset.cni_config().unwrap().is_none());
    }

    #[test]
    fn api_identity() {
        assert_eq!(NetworkAttachmentDefinition::group(&()), "k8s.cni.cncf.io");
        assert_eq!(
            NetworkAttachmentDefinition::plural(&()),
            "network-attachment-definitions"
        );
    }
}
