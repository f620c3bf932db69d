use kube_network_manager_core::{FqName, IpNet};

/// Immutable cluster-wide settings that determine how cluster resources are
/// named and provisioned on the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    pub cluster_name: String,
    pub domain: String,
    pub pod_subnets: Vec<IpNet>,
    pub service_subnets: Vec<IpNet>,
    pub ip_fabric_subnets: Vec<IpNet>,
    pub ip_fabric_forwarding: bool,
    pub ip_fabric_snat: bool,
    pub nested_mode: bool,
    pub ip_fabric_network: FqName,
    /// The underlay network the cluster runs on, in nested mode.
    pub cluster_network: Option<FqName>,
    /// TCP ports of controller services whose flows must not age out, in
    /// nested mode.
    pub flow_aging_ports: Vec<u16>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: "k8s".to_string(),
            domain: "default-domain".to_string(),
            pod_subnets: vec![],
            service_subnets: vec![],
            ip_fabric_subnets: vec![],
            ip_fabric_forwarding: false,
            ip_fabric_snat: false,
            nested_mode: false,
            ip_fabric_network: FqName::new(["default-domain", "default-project", "ip-fabric"]),
            cluster_network: None,
            flow_aging_ports: vec![],
        }
    }
}

impl ClusterConfig {
    pub fn domain_fq_name(&self) -> FqName {
        FqName::new([self.domain.clone()])
    }

    /// The project backing a namespace.
    pub fn project_fq_name(&self, namespace: &str) -> FqName {
        self.domain_fq_name()
            .child(format!("{}-{namespace}", self.cluster_name))
    }

    pub fn default_project(&self) -> FqName {
        self.project_fq_name("default")
    }

    pub fn system_project(&self) -> FqName {
        self.project_fq_name("kube-system")
    }

    pub fn default_sg_name(&self, namespace: &str) -> String {
        format!("{}-{namespace}-default-sg", self.cluster_name)
    }

    pub fn application_policy_set(&self) -> FqName {
        FqName::new(["default-policy-management".to_string(), self.cluster_name.clone()])
    }

    /// A firewall policy of the cluster's application policy set.
    pub fn firewall_policy_fq_name(&self, purpose: &str) -> FqName {
        FqName::new([
            "default-policy-management".to_string(),
            format!("{}-{purpose}", self.cluster_name),
        ])
    }

    /// The tag that marks objects as belonging to this cluster.
    pub fn application_tag_fq_name(&self) -> FqName {
        FqName::new([format!("application={}", self.cluster_name)])
    }

    pub fn ipam_name(&self, purpose: &str) -> String {
        format!("{}-{purpose}-ipam", self.cluster_name)
    }

    pub fn pod_network_name(&self) -> String {
        format!("{}-default-pod-network", self.cluster_name)
    }

    pub fn service_network_name(&self) -> String {
        format!("{}-default-service-network", self.cluster_name)
    }

    pub fn policy_name(&self, purpose: &str) -> String {
        format!("{}-{purpose}-np", self.cluster_name)
    }

    /// The name of the tag representing a Kubernetes label.
    pub fn tag_fq_name(&self, key: &str, value: &str) -> FqName {
        FqName::new([format!("label={key}:{value}")])
    }
}
