//! Firewall policy and rule shapes used by the cluster's application policy
//! set.

use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimpleAction {
    Pass,
    Deny,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallActionList {
    pub simple_action: SimpleAction,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallPortRange {
    pub start_port: i32,
    pub end_port: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallService {
    pub protocol: String,
    pub src_ports: FirewallPortRange,
    pub dst_ports: FirewallPortRange,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallEndpoint {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub any: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Attributes of a reference that orders firewall rules within a policy, or
/// firewall policies within an application policy set. Lower sequences are
/// evaluated first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallSequence {
    pub sequence: String,
}

pub const ACTION_LIST_ATTR: &str = "action_list";
pub const SERVICE_ATTR: &str = "service";
pub const ENDPOINT_1_ATTR: &str = "endpoint_1";
pub const ENDPOINT_2_ATTR: &str = "endpoint_2";
pub const DIRECTION_ATTR: &str = "direction";

/// Matches traffic in both directions between the endpoints.
pub const BIDIRECTIONAL: &str = "<>";

impl FirewallPortRange {
    pub const ANY: Self = Self {
        start_port: 0,
        end_port: 65535,
    };
}

impl FirewallService {
    pub fn any() -> Self {
        Self {
            protocol: "any".to_string(),
            src_ports: FirewallPortRange::ANY,
            dst_ports: FirewallPortRange::ANY,
        }
    }
}

impl FirewallEndpoint {
    pub fn any() -> Self {
        Self {
            any: true,
            tags: Vec::new(),
        }
    }
}

impl FirewallSequence {
    pub fn new(sequence: impl ToString) -> Self {
        Self {
            sequence: sequence.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn any_endpoints_omit_tags() {
        assert_eq!(
            serde_json::to_value(FirewallEndpoint::any()).unwrap(),
            json!({ "any": true })
        );
        assert_eq!(
            serde_json::to_value(FirewallActionList {
                simple_action: SimpleAction::Deny
            })
            .unwrap(),
            json!({ "simple_action": "deny" })
        );
    }
}
