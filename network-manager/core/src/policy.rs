//! Network policy rule shapes.

use crate::FqName;
use serde::{Deserialize, Serialize};

/// A policy rule endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Address {
    VirtualNetwork(String),
    NetworkPolicy(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub start_port: i32,
    pub end_port: i32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionList {
    pub simple_action: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub direction: String,
    pub action_list: ActionList,
    pub protocol: String,
    pub src_addresses: Vec<Address>,
    pub src_ports: Vec<PortRange>,
    pub dst_addresses: Vec<Address>,
    pub dst_ports: Vec<PortRange>,
}

/// The `network_policy_entries` property of a network policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntries {
    pub policy_rule: Vec<PolicyRule>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    pub major: i32,
    pub minor: i32,
}

/// Attributes of a virtual-network to network-policy reference.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkPolicy {
    pub sequence: Sequence,
}

pub const ENTRIES_ATTR: &str = "network_policy_entries";

impl PortRange {
    pub const ANY: Self = Self {
        start_port: -1,
        end_port: -1,
    };
}

impl Address {
    pub fn network(fq_name: &FqName) -> Self {
        Self::VirtualNetwork(fq_name.to_string())
    }

    pub fn policy(fq_name: &FqName) -> Self {
        Self::NetworkPolicy(fq_name.to_string())
    }
}

impl PolicyRule {
    /// A bidirectional rule permitting any protocol on any port between `src`
    /// and the virtual network `dst`.
    pub fn permit_any(src: Address, dst: &FqName) -> Self {
        Self {
            direction: "<>".to_string(),
            action_list: ActionList {
                simple_action: "pass".to_string(),
            },
            protocol: "any".to_string(),
            src_addresses: vec![src],
            src_ports: vec![PortRange::ANY],
            dst_addresses: vec![Address::network(dst)],
            dst_ports: vec![PortRange::ANY],
        }
    }
}

impl PolicyEntries {
    /// Permits everything between each pair of `networks`.
    ///
    /// One rule is emitted for every `i < j`, so N networks yield N*(N-1)/2
    /// rules.
    pub fn mesh(networks: &[FqName]) -> Self {
        let mut policy_rule = Vec::new();
        for (i, src) in networks.iter().enumerate() {
            for dst in &networks[i + 1..] {
                policy_rule.push(PolicyRule::permit_any(Address::network(src), dst));
            }
        }
        Self { policy_rule }
    }

    /// Permits everything between the members of the policy itself and the
    /// virtual network `dst`.
    pub fn from_policy(policy: &FqName, dst: &FqName) -> Self {
        Self {
            policy_rule: vec![PolicyRule::permit_any(Address::policy(policy), dst)],
        }
    }
}

impl VirtualNetworkPolicy {
    /// Policies are attached at a fixed sequence number.
    pub const DEFAULT: Self = Self {
        sequence: Sequence { major: 0, minor: 0 },
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn pairs(entries: &PolicyEntries) -> HashSet<(String, String)> {
        entries
            .policy_rule
            .iter()
            .map(|r| {
                assert_eq!(r.direction, "<>");
                assert_eq!(r.protocol, "any");
                assert_eq!(r.src_ports, vec![PortRange::ANY]);
                assert_eq!(r.dst_ports, vec![PortRange::ANY]);
                let name = |a: &Address| match a {
                    Address::VirtualNetwork(n) | Address::NetworkPolicy(n) => n.clone(),
                };
                let (a, b) = (name(&r.src_addresses[0]), name(&r.dst_addresses[0]));
                if a < b {
                    (a, b)
                } else {
                    (b, a)
                }
            })
            .collect()
    }

    #[test]
    fn mesh_permits_each_pair_once() {
        let a = FqName::new(["d", "p", "a"]);
        let b = FqName::new(["d", "p", "b"]);
        let c = FqName::new(["d", "p", "c"]);

        let entries = PolicyEntries::mesh(&[a.clone(), b.clone(), c.clone()]);
        assert_eq!(entries.policy_rule.len(), 3);

        let expected = [("d:p:a", "d:p:b"), ("d:p:a", "d:p:c"), ("d:p:b", "d:p:c")]
            .into_iter()
            .map(|(x, y)| (x.to_string(), y.to_string()))
            .collect::<HashSet<_>>();
        assert_eq!(pairs(&entries), expected);

        let reordered = PolicyEntries::mesh(&[c, a, b]);
        assert_eq!(reordered.policy_rule.len(), 3);
        assert_eq!(pairs(&reordered), expected);
    }

    #[test]
    fn mesh_of_two_is_a_single_rule() {
        let entries = PolicyEntries::mesh(&[FqName::new(["pod"]), FqName::new(["svc"])]);
        assert_eq!(entries.policy_rule.len(), 1);
        assert!(PolicyEntries::mesh(&[FqName::new(["pod"])])
            .policy_rule
            .is_empty());
    }

    #[test]
    fn policy_rules_use_the_policy_as_source() {
        let np = FqName::new(["d", "p", "np"]);
        let vn = FqName::new(["d", "p", "vn"]);
        let entries = PolicyEntries::from_policy(&np, &vn);
        assert_eq!(
            entries.policy_rule[0].src_addresses,
            vec![Address::NetworkPolicy("d:p:np".to_string())]
        );
        assert_eq!(
            serde_json::to_value(&entries.policy_rule[0].dst_addresses).unwrap(),
            serde_json::json!([{ "virtual_network": "d:p:vn" }])
        );
    }
}
