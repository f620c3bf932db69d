//! Cluster bootstrap.
//!
//! Provisions the projects, IPAMs, virtual networks and policies that
//! namespace and pod resources are attached to. Every step reads objects by
//! their deterministic fq-name and only creates what is missing, so running
//! the bootstrap again (e.g. after a restart) converges on the same objects.

use crate::ClusterConfig;
use kube_network_manager_cache::Cache;
use kube_network_manager_core::{
    firewall::{
        FirewallActionList, FirewallEndpoint, FirewallSequence, FirewallService, SimpleAction,
        ACTION_LIST_ATTR, BIDIRECTIONAL, DIRECTION_ATTR, ENDPOINT_1_ATTR, ENDPOINT_2_ATTR,
        SERVICE_ATTR,
    },
    network::{
        FlowAgingTimeouts, IpamSubnet, IpamSubnets, PortTranslationPools,
        VirtualNetworkProperties, VnSubnets, ADDRESS_ALLOCATION_MODE_ATTR, FABRIC_SNAT_ATTR,
        FLAT_SUBNET, FLAT_SUBNET_ONLY, FLOW_AGING_NEVER, FLOW_AGING_TIMEOUTS_ATTR,
        IPAM_SUBNETS_ATTR, IPAM_SUBNET_METHOD_ATTR, PORT_TRANSLATION_POOLS_ATTR,
        VN_PROPERTIES_ATTR,
    },
    policy::{PolicyEntries, VirtualNetworkPolicy, ENTRIES_ATTR},
    ApiError, Create, FqName, IpNet, SharedApi, VncApi, VncKind, VncObject,
};
use serde_json::json;
use std::sync::Arc;
use tokio::time;

const NAT_POOL_START_PORT: i32 = 56000;
const NAT_POOL_PORT_COUNT: i32 = 1024;

// Firewall policies are evaluated in sequence order. Network policies are
// placed between the ingress and the deny-all policies.
const INGRESS_SEQUENCE: &str = "1.0";
const DENY_ALL_SEQUENCE: &str = "99998.0";
const ALLOW_ALL_SEQUENCE: &str = "99999.0";

/// Runs the bootstrap steps against a connected controller.
pub struct Bootstrap {
    api: SharedApi,
    cache: Cache<VncKind>,
    config: Arc<ClusterConfig>,
    domain_wait: time::Duration,
    nat_retry: time::Duration,
    nat_attempts: usize,
}

/// The cluster-wide objects produced by a bootstrap.
#[derive(Clone, Debug)]
pub struct Provisioned {
    pub default_project: VncObject,
    pub system_project: VncObject,
    pub ip_fabric_network: VncObject,
    pub ip_fabric_ipam: FqName,
    pub pod_ipam: FqName,
    pub service_ipam: FqName,
    pub pod_network: VncObject,
    pub service_network: VncObject,
    pub ip_fabric_policy: VncObject,
    pub service_policy: VncObject,
    pub pod_service_policy: VncObject,
    pub nested_underlay_policy: Option<VncObject>,
    pub nat_pools: NatPools,
    pub security: SecurityPolicies,
}

/// The firewall policies of the cluster's application policy set.
#[derive(Clone, Debug)]
pub struct SecurityPolicies {
    pub application_policy_set: VncObject,
    pub ingress: VncObject,
    pub deny_all: VncObject,
    pub allow_all: VncObject,
    /// Identifies the cluster's objects and application policy set.
    pub application_tag: VncObject,
}

/// Whether NAT port pools were allocated.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NatPools {
    Allocated,
    /// The global vrouter configuration could not be found; fabric SNAT will
    /// use the controller's defaults.
    Skipped,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to {step}")]
pub struct Error {
    step: &'static str,
    #[source]
    source: ApiError,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Role {
    Pod,
    Service,
}

trait StepExt<T> {
    fn step(self, step: &'static str) -> Result<T, Error>;
}

impl<T> StepExt<T> for Result<T, ApiError> {
    fn step(self, step: &'static str) -> Result<T, Error> {
        self.map_err(|source| Error { step, source })
    }
}

// === impl Bootstrap ===

impl Bootstrap {
    pub fn new(api: SharedApi, cache: Cache<VncKind>, config: Arc<ClusterConfig>) -> Self {
        Self {
            api,
            cache,
            config,
            domain_wait: time::Duration::from_secs(60),
            nat_retry: time::Duration::from_secs(3),
            nat_attempts: 20,
        }
    }

    pub fn with_domain_wait(mut self, interval: time::Duration) -> Self {
        self.domain_wait = interval;
        self
    }

    pub fn with_nat_retry(mut self, interval: time::Duration, attempts: usize) -> Self {
        self.nat_retry = interval;
        self.nat_attempts = attempts;
        self
    }

    pub async fn run(&self) -> Result<Provisioned, Error> {
        let config = &*self.config;

        self.wait_for_domain().await?;

        let default_project = self.ensure_project("default").await?;
        let system_project = self.ensure_project("kube-system").await?;
        let aps = self.ensure_application_policy_set().await?;

        let nat_pools = self.allocate_nat_pools().await;
        if config.nested_mode {
            self.disable_flow_aging().await;
        }

        let ip_fabric_network = self
            .api
            .read(VncKind::VirtualNetwork, &config.ip_fabric_network)
            .await
            .step("read the ip-fabric network")?;
        let cluster_network = self.cluster_network().await?;

        let (ip_fabric_ipam, ip_fabric_ipam_updated) = self
            .ensure_ipam("ip-fabric", &config.ip_fabric_subnets, &default_project)
            .await?;
        let (pod_ipam, pod_ipam_updated) = self
            .ensure_ipam("pod", &config.pod_subnets, &default_project)
            .await?;
        let (service_ipam, service_ipam_updated) = self
            .ensure_ipam("service", &config.service_subnets, &default_project)
            .await?;

        let pod_network = if config.ip_fabric_forwarding {
            self.ensure_network(
                Role::Pod,
                &default_project,
                &ip_fabric_ipam,
                ip_fabric_ipam_updated,
                Some(&ip_fabric_network),
            )
            .await?
        } else {
            self.ensure_network(
                Role::Pod,
                &default_project,
                &pod_ipam,
                pod_ipam_updated,
                Some(&ip_fabric_network),
            )
            .await?
        };
        let service_network = self
            .ensure_network(
                Role::Service,
                &default_project,
                &service_ipam,
                service_ipam_updated,
                None,
            )
            .await?;

        let project = &default_project.fq_name;
        let ip_fabric_policy = {
            let fq_name = project.child(config.policy_name("default-ip-fabric"));
            let entries = PolicyEntries::from_policy(&fq_name, &ip_fabric_network.fq_name);
            self.ensure_policy(fq_name, entries).await?
        };
        let service_policy = {
            let fq_name = project.child(config.policy_name("default-service"));
            let entries = PolicyEntries::from_policy(&fq_name, &service_network.fq_name);
            self.ensure_policy(fq_name, entries).await?
        };
        let pod_service_policy = {
            let fq_name = project.child(config.policy_name("default-pod-service"));
            let entries = PolicyEntries::mesh(&[
                pod_network.fq_name.clone(),
                service_network.fq_name.clone(),
            ]);
            self.ensure_policy(fq_name, entries).await?
        };

        let ip_fabric_network = self
            .attach(ip_fabric_network, &[&ip_fabric_policy])
            .await?;
        let pod_network = self
            .attach(pod_network, &[&ip_fabric_policy, &pod_service_policy])
            .await?;
        let service_network = self
            .attach(
                service_network,
                &[&ip_fabric_policy, &service_policy, &pod_service_policy],
            )
            .await?;

        let nested_underlay_policy = match cluster_network {
            Some(underlay) => {
                let fq_name = project.child(config.policy_name("nested-underlay"));
                let entries = PolicyEntries::from_policy(&fq_name, &underlay.fq_name);
                let policy = self.ensure_policy(fq_name, entries).await?;
                self.attach(underlay, &[&policy]).await?;
                Some(policy)
            }
            None => None,
        };

        let security = self.ensure_security_policies(aps).await?;

        tracing::info!(cluster = %config.cluster_name, ?nat_pools, "Provisioned cluster");
        Ok(Provisioned {
            default_project,
            system_project,
            ip_fabric_network,
            ip_fabric_ipam,
            pod_ipam,
            service_ipam,
            pod_network,
            service_network,
            ip_fabric_policy,
            service_policy,
            pod_service_policy,
            nested_underlay_policy,
            nat_pools,
            security,
        })
    }

    /// Blocks until the configured domain exists.
    async fn wait_for_domain(&self) -> Result<(), Error> {
        let domain = self.config.domain_fq_name();
        loop {
            match self.api.read(VncKind::Domain, &domain).await {
                Ok(_) => {
                    tracing::info!(%domain, "Domain available");
                    return Ok(());
                }
                Err(error) if error.is_not_found() || error.is_transient() => {
                    tracing::error!(
                        %domain,
                        %error,
                        retry_in = ?self.domain_wait,
                        "Domain not available"
                    );
                }
                Err(error) => return Err(error).step("read the cluster domain"),
            }
            time::sleep(self.domain_wait).await;
        }
    }

    async fn ensure_project(&self, namespace: &str) -> Result<VncObject, Error> {
        ensure_project(&*self.api, &self.cache, &self.config, namespace).await
    }

    async fn ensure_application_policy_set(&self) -> Result<VncObject, Error> {
        let aps = VncObject::new(
            VncKind::ApplicationPolicySet,
            self.config.application_policy_set(),
        );
        create_or_get(&*self.api, &self.cache, aps)
            .await
            .step("create the cluster application policy set")
    }

    /// Sets fixed TCP and UDP port translation pools on the global vrouter
    /// configuration, giving up if it does not appear in time.
    async fn allocate_nat_pools(&self) -> NatPools {
        let fq_name = vrouter_config_fq_name();

        let mut attempt = 0;
        let mut config = loop {
            match self.api.read(VncKind::GlobalVrouterConfig, &fq_name).await {
                Ok(config) => break config,
                Err(error) if attempt < self.nat_attempts => {
                    tracing::debug!(%error, attempt, "Global vrouter config not available");
                }
                Err(error) => {
                    tracing::error!(
                        %error,
                        attempts = attempt + 1,
                        "Global vrouter config not available; skipping NAT pool allocation"
                    );
                    return NatPools::Skipped;
                }
            }
            attempt += 1;
            time::sleep(self.nat_retry).await;
        };

        let pools = PortTranslationPools::tcp_udp(NAT_POOL_START_PORT, NAT_POOL_PORT_COUNT);
        if let Err(error) = config.set_attr(PORT_TRANSLATION_POOLS_ATTR, pools) {
            tracing::error!(%error, "Failed to encode NAT pools");
            return NatPools::Skipped;
        }
        match self.api.update(&config).await {
            Ok(()) => NatPools::Allocated,
            Err(error) => {
                tracing::error!(%error, "Failed to allocate NAT pools");
                NatPools::Skipped
            }
        }
    }

    /// Keeps flows to the controller's services from aging out, so that a
    /// nested cluster does not lose its connections to them.
    async fn disable_flow_aging(&self) {
        let ports = &self.config.flow_aging_ports;
        if ports.is_empty() {
            return;
        }

        let fq_name = vrouter_config_fq_name();
        let mut config = match self.api.try_read(VncKind::GlobalVrouterConfig, &fq_name).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::warn!("Global vrouter config not available; flows may age out");
                return;
            }
            Err(error) => {
                tracing::error!(%error, "Failed to read the global vrouter config");
                return;
            }
        };

        let mut timeouts = config
            .attr::<FlowAgingTimeouts>(FLOW_AGING_TIMEOUTS_ATTR)
            .unwrap_or_default();
        let mut changed = false;
        for port in ports {
            changed |= timeouts.set_tcp(*port, FLOW_AGING_NEVER);
        }
        if !changed {
            return;
        }

        if let Err(error) = config.set_attr(FLOW_AGING_TIMEOUTS_ATTR, &timeouts) {
            tracing::error!(%error, "Failed to encode flow aging timeouts");
            return;
        }
        match self.api.update(&config).await {
            Ok(()) => tracing::info!(?ports, "Disabled flow aging for controller services"),
            Err(error) => tracing::error!(%error, "Failed to set flow aging timeouts"),
        }
    }

    /// Creates the ingress, deny-all and allow-all firewall policies and
    /// attaches them, along with the cluster's application tag, to the
    /// application policy set.
    async fn ensure_security_policies(&self, aps: VncObject) -> Result<SecurityPolicies, Error> {
        let config = &*self.config;
        let ingress = self
            .ensure_firewall_policy(config.firewall_policy_fq_name("Ingress"), None)
            .await?;
        let deny_all = self
            .ensure_firewall_policy(
                config.firewall_policy_fq_name("denyall"),
                Some(SimpleAction::Deny),
            )
            .await?;
        let allow_all = self
            .ensure_firewall_policy(
                config.firewall_policy_fq_name("allowall"),
                Some(SimpleAction::Pass),
            )
            .await?;

        let mut tag = VncObject::new(VncKind::Tag, config.application_tag_fq_name());
        tag.set_attr("tag_type_name", "application")
            .step("encode the cluster application tag")?;
        tag.set_attr("tag_value", &config.cluster_name)
            .step("encode the cluster application tag")?;
        let application_tag = create_or_get(&*self.api, &self.cache, tag)
            .await
            .step("create the cluster application tag")?;

        let mut aps = self
            .api
            .read(VncKind::ApplicationPolicySet, &aps.fq_name)
            .await
            .step("read the cluster application policy set")?;
        let mut changed = false;
        for (policy, sequence) in [
            (&ingress, INGRESS_SEQUENCE),
            (&deny_all, DENY_ALL_SEQUENCE),
            (&allow_all, ALLOW_ALL_SEQUENCE),
        ] {
            let attr = serde_json::to_value(FirewallSequence::new(sequence))
                .map_err(ApiError::from)
                .step("encode a firewall policy attachment")?;
            changed |= aps.add_ref(policy, Some(attr));
        }
        changed |= aps.add_ref(&application_tag, None);
        if changed {
            self.api
                .update(&aps)
                .await
                .step("attach firewall policies")?;
        }
        self.cache.apply(&aps);

        Ok(SecurityPolicies {
            application_policy_set: aps,
            ingress,
            deny_all,
            allow_all,
            application_tag,
        })
    }

    /// Creates a firewall policy. A policy with an action gets a single rule
    /// applying it to all traffic.
    async fn ensure_firewall_policy(
        &self,
        fq_name: FqName,
        action: Option<SimpleAction>,
    ) -> Result<VncObject, Error> {
        let policy = VncObject::new(VncKind::FirewallPolicy, fq_name);
        let mut policy = create_or_get(&*self.api, &self.cache, policy)
            .await
            .step("create a firewall policy")?;
        let Some(simple_action) = action else {
            return Ok(policy);
        };

        let mut rule = VncObject::new(
            VncKind::FirewallRule,
            FqName::new([
                "default-policy-management".to_string(),
                format!("{}-rule", policy.name()),
            ]),
        );
        rule.set_attr(ACTION_LIST_ATTR, FirewallActionList { simple_action })
            .step("encode a firewall rule")?;
        rule.set_attr(SERVICE_ATTR, FirewallService::any())
            .step("encode a firewall rule")?;
        rule.set_attr(ENDPOINT_1_ATTR, FirewallEndpoint::any())
            .step("encode a firewall rule")?;
        rule.set_attr(ENDPOINT_2_ATTR, FirewallEndpoint::any())
            .step("encode a firewall rule")?;
        rule.set_attr(DIRECTION_ATTR, BIDIRECTIONAL)
            .step("encode a firewall rule")?;
        let rule = create_or_get(&*self.api, &self.cache, rule)
            .await
            .step("create a firewall rule")?;

        let attr = serde_json::to_value(FirewallSequence::new("0.0"))
            .map_err(ApiError::from)
            .step("encode a firewall rule attachment")?;
        if policy.add_ref(&rule, Some(attr)) {
            self.api
                .update(&policy)
                .await
                .step("attach a firewall rule")?;
            self.cache.apply(&policy);
        }
        Ok(policy)
    }

    async fn cluster_network(&self) -> Result<Option<VncObject>, Error> {
        if !self.config.nested_mode {
            return Ok(None);
        }
        let Some(fq_name) = self.config.cluster_network.as_ref() else {
            tracing::warn!("Nested mode is enabled without an underlay network");
            return Ok(None);
        };
        let network = self
            .api
            .try_read(VncKind::VirtualNetwork, fq_name)
            .await
            .step("read the underlay network")?;
        if network.is_none() {
            tracing::info!(network = %fq_name, "Underlay network not found");
        }
        Ok(network)
    }

    /// Creates a flat-subnet IPAM, returning its fq-name and whether its
    /// subnets were set by this call.
    async fn ensure_ipam(
        &self,
        purpose: &str,
        subnets: &[IpNet],
        project: &VncObject,
    ) -> Result<(FqName, bool), Error> {
        let fq_name = project.fq_name.child(self.config.ipam_name(purpose));
        let subnets = subnets.iter().map(IpamSubnet::from).collect::<IpamSubnets>();
        if subnets.is_empty() {
            tracing::error!(ipam = %fq_name, "No subnets configured");
        }

        let mut ipam =
            VncObject::new(VncKind::NetworkIpam, fq_name.clone()).with_parent(VncKind::Project);
        ipam.set_attr(IPAM_SUBNET_METHOD_ATTR, FLAT_SUBNET)
            .step("encode an IPAM")?;
        ipam.set_attr(IPAM_SUBNETS_ATTR, &subnets)
            .step("encode an IPAM")?;

        let updated = match self.api.create(ipam.clone()).await.step("create an IPAM")? {
            Create::Created(created) => {
                self.cache.apply(&created);
                true
            }
            Create::AlreadyExists(existing) => {
                let current = existing
                    .attr::<IpamSubnets>(IPAM_SUBNETS_ATTR)
                    .unwrap_or_default();
                let updated = current.is_empty();
                if updated {
                    ipam.uuid = existing.uuid.clone();
                    self.api.update(&ipam).await.step("update an IPAM")?;
                    self.cache.apply(&ipam);
                } else {
                    self.cache.apply(&existing);
                }
                updated
            }
        };

        Ok((fq_name, updated))
    }

    /// Creates one of the cluster's virtual networks or updates the existing
    /// one in place.
    async fn ensure_network(
        &self,
        role: Role,
        project: &VncObject,
        ipam: &FqName,
        ipam_updated: bool,
        provider: Option<&VncObject>,
    ) -> Result<VncObject, Error> {
        let config = &*self.config;
        let name = match role {
            Role::Pod => config.pod_network_name(),
            Role::Service => config.service_network_name(),
        };
        let fq_name = project.fq_name.child(name);

        let existing = self
            .api
            .try_read(VncKind::VirtualNetwork, &fq_name)
            .await
            .step("read a virtual network")?;
        let exists = existing.is_some();
        let mut network = existing.unwrap_or_else(|| {
            VncObject::new(VncKind::VirtualNetwork, fq_name.clone()).with_parent(VncKind::Project)
        });
        network
            .set_attr(ADDRESS_ALLOCATION_MODE_ATTR, FLAT_SUBNET_ONLY)
            .step("encode a virtual network")?;

        if ipam_updated || !network.has_ref(VncKind::NetworkIpam, ipam) {
            let ipam = self
                .api
                .read(VncKind::NetworkIpam, ipam)
                .await
                .step("read an IPAM")?;
            // Flat-subnet IPAMs carry their subnets, so the link is empty.
            let attr = serde_json::to_value(VnSubnets::default())
                .map_err(ApiError::from)
                .step("encode a virtual network")?;
            network.add_ref(&ipam, Some(attr));
        }

        network
            .set_attr(VN_PROPERTIES_ATTR, VirtualNetworkProperties::l3())
            .step("encode a virtual network")?;

        let forwarding = config.ip_fabric_forwarding && role == Role::Pod;
        let snat = role == Role::Pod && config.ip_fabric_snat && !config.ip_fabric_forwarding;
        network
            .set_attr(FABRIC_SNAT_ATTR, snat)
            .step("encode a virtual network")?;

        if exists {
            self.api
                .update(&network)
                .await
                .step("update a virtual network")?;
        } else {
            if forwarding {
                if let Some(provider) = provider {
                    network.add_ref(provider, None);
                }
            }
            self.api
                .create(network)
                .await
                .step("create a virtual network")?;
        }

        let network = self
            .api
            .read(VncKind::VirtualNetwork, &fq_name)
            .await
            .step("read a virtual network")?;
        self.cache.apply(&network);
        Ok(network)
    }

    /// Creates a network policy with the given rules, replacing the rules of
    /// an existing policy.
    async fn ensure_policy(
        &self,
        fq_name: FqName,
        entries: PolicyEntries,
    ) -> Result<VncObject, Error> {
        let existing = self
            .api
            .try_read(VncKind::NetworkPolicy, &fq_name)
            .await
            .step("read a network policy")?;

        let policy = match existing {
            Some(mut policy) => {
                policy
                    .set_attr(ENTRIES_ATTR, &entries)
                    .step("encode a network policy")?;
                self.api
                    .update(&policy)
                    .await
                    .step("update a network policy")?;
                policy
            }
            None => {
                let mut policy = VncObject::new(VncKind::NetworkPolicy, fq_name)
                    .with_parent(VncKind::Project);
                policy
                    .set_attr(ENTRIES_ATTR, &entries)
                    .step("encode a network policy")?;
                self.api
                    .create(policy)
                    .await
                    .step("create a network policy")?
                    .into_object()
            }
        };
        self.cache.apply(&policy);
        Ok(policy)
    }

    /// Attaches policies to a network at the default sequence and relaxes the
    /// references so that the policies remain deletable.
    async fn attach(
        &self,
        mut network: VncObject,
        policies: &[&VncObject],
    ) -> Result<VncObject, Error> {
        let attr = serde_json::to_value(VirtualNetworkPolicy::DEFAULT)
            .map_err(ApiError::from)
            .step("encode a policy attachment")?;
        for policy in policies {
            network.add_ref(policy, Some(attr.clone()));
        }
        self.api
            .update(&network)
            .await
            .step("attach network policies")?;

        if let Some(uuid) = network.uuid() {
            for policy in policies {
                if let Some(policy_uuid) = policy.uuid() {
                    self.api
                        .ref_relax_for_delete(uuid, policy_uuid)
                        .await
                        .step("relax a policy reference")?;
                }
            }
        }
        self.cache.apply(&network);
        Ok(network)
    }
}

fn vrouter_config_fq_name() -> FqName {
    FqName::new([
        "default-global-system-config",
        "default-global-vrouter-config",
    ])
}

/// Creates (or fetches) the project backing a namespace along with the
/// project's default security group.
pub async fn ensure_project(
    api: &dyn VncApi,
    cache: &Cache<VncKind>,
    config: &ClusterConfig,
    namespace: &str,
) -> Result<VncObject, Error> {
    let fq_name = config.project_fq_name(namespace);
    let project = VncObject::new(VncKind::Project, fq_name).with_parent(VncKind::Domain);
    let project = create_or_get(api, cache, project)
        .await
        .step("create a project")?;

    let mut sg = VncObject::new(
        VncKind::SecurityGroup,
        project.fq_name.child(config.default_sg_name(namespace)),
    )
    .with_parent(VncKind::Project);
    sg.attributes.insert(
        "id_perms".to_string(),
        json!({ "enable": true, "description": "Default security group" }),
    );
    sg.set_attr("security_group_entries", PolicyEntries::default())
        .step("encode the default security group")?;
    create_or_get(api, cache, sg)
        .await
        .step("create a default security group")?;

    Ok(project)
}

/// Creates an object, tolerating an existing object with the same name.
pub async fn create_or_get(
    api: &dyn VncApi,
    cache: &Cache<VncKind>,
    obj: VncObject,
) -> Result<VncObject, ApiError> {
    let obj = match api.create(obj).await? {
        Create::Created(obj) => {
            tracing::info!(kind = %obj.kind, name = %obj.fq_name, "Created");
            obj
        }
        Create::AlreadyExists(obj) => {
            tracing::debug!(kind = %obj.kind, name = %obj.fq_name, "Already exists");
            obj
        }
    };
    cache.apply(&obj);
    Ok(obj)
}

/// Deletes an object by fq-name, returning false if the controller did not
/// have it.
pub async fn delete(
    api: &dyn VncApi,
    cache: &Cache<VncKind>,
    kind: VncKind,
    fq_name: &FqName,
) -> Result<bool, ApiError> {
    let uuid = match cache.find_by_fq_name(kind, fq_name) {
        Some(cached) => cached.uuid().to_string(),
        None => match api.try_read(kind, fq_name).await? {
            Some(VncObject {
                uuid: Some(uuid), ..
            }) => uuid,
            _ => return Ok(false),
        },
    };

    let deleted = match api.delete(kind, &uuid).await {
        Ok(()) => {
            tracing::info!(%kind, name = %fq_name, "Deleted");
            true
        }
        Err(error) if error.is_not_found() => false,
        Err(error) => return Err(error),
    };
    cache.delete(kind, &uuid);
    Ok(deleted)
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("config", &self.config)
            .field("domain_wait", &self.domain_wait)
            .field("nat_retry", &self.nat_retry)
            .field("nat_attempts", &self.nat_attempts)
            .finish()
    }
}
