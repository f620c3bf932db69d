//! Virtual network, IPAM and NAT property shapes.

use crate::{policy::PortRange, IpNet};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub ip_prefix: String,
    pub ip_prefix_len: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamSubnet {
    pub subnet: Subnet,
}

/// The `ipam_subnets` property of a flat-subnet IPAM.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamSubnets {
    pub subnets: Vec<IpamSubnet>,
}

/// Attributes of a virtual-network to IPAM reference.
///
/// Flat-subnet IPAMs carry their subnets themselves, so the link is empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VnSubnets {
    pub ipam_subnets: Vec<IpamSubnet>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkProperties {
    pub forwarding_mode: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTranslationPool {
    pub protocol: String,
    pub port_range: PortRange,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortTranslationPools {
    pub port_translation_pool: Vec<PortTranslationPool>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowAgingTimeout {
    pub protocol: String,
    pub port: u16,
    pub timeout_in_seconds: i32,
}

/// The `flow_aging_timeout_list` property of the global vrouter config.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowAgingTimeouts {
    pub flow_aging_timeout: Vec<FlowAgingTimeout>,
}

pub const IPAM_SUBNET_METHOD_ATTR: &str = "ipam_subnet_method";
pub const IPAM_SUBNETS_ATTR: &str = "ipam_subnets";
pub const ADDRESS_ALLOCATION_MODE_ATTR: &str = "address_allocation_mode";
pub const VN_PROPERTIES_ATTR: &str = "virtual_network_properties";
pub const FABRIC_SNAT_ATTR: &str = "fabric_snat";
pub const PORT_TRANSLATION_POOLS_ATTR: &str = "port_translation_pools";
pub const FLOW_AGING_TIMEOUTS_ATTR: &str = "flow_aging_timeout_list";

/// The largest timeout the vrouter accepts; flows with it never age out.
pub const FLOW_AGING_NEVER: i32 = i32::MAX;

pub const FLAT_SUBNET: &str = "flat-subnet";
pub const FLAT_SUBNET_ONLY: &str = "flat-subnet-only";

impl From<&IpNet> for IpamSubnet {
    fn from(net: &IpNet) -> Self {
        Self {
            subnet: Subnet {
                ip_prefix: net.network().to_string(),
                ip_prefix_len: net.prefix_len(),
            },
        }
    }
}

impl FromIterator<IpamSubnet> for IpamSubnets {
    fn from_iter<T: IntoIterator<Item = IpamSubnet>>(iter: T) -> Self {
        Self {
            subnets: iter.into_iter().collect(),
        }
    }
}

impl IpamSubnets {
    pub fn is_empty(&self) -> bool {
        self.subnets.is_empty()
    }
}

impl VirtualNetworkProperties {
    pub fn l3() -> Self {
        Self {
            forwarding_mode: "l3".to_string(),
        }
    }
}

impl PortTranslationPools {
    /// Splits `count` ports starting at `start` into a TCP range followed by a
    /// disjoint UDP range of the same size.
    pub fn tcp_udp(start: i32, count: i32) -> Self {
        let tcp = PortRange {
            start_port: start,
            end_port: start + count - 1,
        };
        let udp = PortRange {
            start_port: tcp.end_port + 1,
            end_port: tcp.end_port + count,
        };
        Self {
            port_translation_pool: vec![
                PortTranslationPool {
                    protocol: "tcp".to_string(),
                    port_range: tcp,
                },
                PortTranslationPool {
                    protocol: "udp".to_string(),
                    port_range: udp,
                },
            ],
        }
    }
}

impl FlowAgingTimeouts {
    /// Sets the timeout of a TCP port, returning false if it was already set.
    pub fn set_tcp(&mut self, port: u16, timeout_in_seconds: i32) -> bool {
        let entry = self
            .flow_aging_timeout
            .iter_mut()
            .find(|t| t.protocol == "tcp" && t.port == port);
        match entry {
            Some(entry) if entry.timeout_in_seconds == timeout_in_seconds => false,
            Some(entry) => {
                entry.timeout_in_seconds = timeout_in_seconds;
                true
            }
            None => {
                self.flow_aging_timeout.push(FlowAgingTimeout {
                    protocol: "tcp".to_string(),
                    port,
                    timeout_in_seconds,
                });
                true
            }
        }
    }
}
