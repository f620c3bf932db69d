use crate::{
    cache::{Cache, LabelCache},
    core::{FqName, IpNet, ResourceKind, SharedApi},
    events::{self, EventSource},
    k8s::{self, Client, Resource},
    managers,
    metrics::{self, Metrics},
    reconcile::Reconciler,
    vnc::{
        self, health::LogReporter, Bootstrap, ClusterConfig, ConnectionManager, HttpConnector,
        MemoryApi,
    },
    Context,
};
use anyhow::{bail, Context as _, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "kube-network-manager",
    about = "Reconciles Kubernetes networking onto a network controller"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "kube_network_manager=info,warn",
        env = "KUBE_NETWORK_MANAGER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Prefixes the names of all cluster resources on the controller.
    #[clap(long, default_value = "k8s")]
    cluster_name: String,

    /// The controller domain that cluster projects are created in.
    #[clap(long, default_value = "default-domain")]
    cluster_domain: String,

    #[clap(long, default_value = "10.32.0.0/12")]
    pod_subnets: IpNets,

    #[clap(long, default_value = "10.96.0.0/12")]
    service_subnets: IpNets,

    #[clap(long, default_value = "10.64.0.0/12")]
    ip_fabric_subnets: IpNets,

    /// Forwards pod traffic through the ip-fabric network.
    #[clap(long)]
    ip_fabric_forwarding: bool,

    /// Source-NATs pod traffic leaving through the fabric.
    #[clap(long)]
    ip_fabric_snat: bool,

    /// Runs the cluster nested in an overlay network.
    #[clap(long)]
    nested_mode: bool,

    #[clap(long, default_value = "default-domain:default-project:ip-fabric")]
    ip_fabric_network: FqName,

    /// The underlay network of a nested cluster.
    #[clap(long)]
    cluster_network: Option<FqName>,

    #[clap(long, value_delimiter = ',', default_value = "127.0.0.1")]
    vnc_endpoint_ip: Vec<String>,

    #[clap(long, default_value = "8082")]
    vnc_endpoint_port: u16,

    /// Controller database servers as `host:port`, kept reachable in nested
    /// mode.
    #[clap(long, value_delimiter = ',')]
    cassandra_server_list: Vec<HostPort>,

    #[clap(long, default_value = "5672")]
    rabbit_port: u16,

    /// Analytics collectors as `host:port`, kept reachable in nested mode.
    #[clap(long, value_delimiter = ',')]
    collectors: Vec<HostPort>,

    #[clap(long, env = "KUBE_NETWORK_MANAGER_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Seconds between periodic resyncs of each kind. Zero disables them.
    #[clap(long, default_value = "60")]
    kube_timer_interval: u64,

    #[clap(long, default_value = "3")]
    connect_retry_interval: u64,

    #[clap(long, default_value = "60")]
    domain_wait_interval: u64,

    /// Provisions against an in-memory controller instead of connecting to
    /// one.
    #[clap(long)]
    dry_run: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            cluster_name,
            cluster_domain,
            pod_subnets: IpNets(pod_subnets),
            service_subnets: IpNets(service_subnets),
            ip_fabric_subnets: IpNets(ip_fabric_subnets),
            ip_fabric_forwarding,
            ip_fabric_snat,
            nested_mode,
            ip_fabric_network,
            cluster_network,
            vnc_endpoint_ip,
            vnc_endpoint_port,
            cassandra_server_list,
            rabbit_port,
            collectors,
            auth_token,
            kube_timer_interval,
            connect_retry_interval,
            domain_wait_interval,
            dry_run,
        } = self;

        let flow_aging_ports = if nested_mode {
            let mut ports = cassandra_server_list
                .iter()
                .chain(&collectors)
                .map(|HostPort(port)| *port)
                .chain([rabbit_port, vnc_endpoint_port])
                .collect::<Vec<_>>();
            ports.sort_unstable();
            ports.dedup();
            ports
        } else {
            vec![]
        };

        let config = Arc::new(ClusterConfig {
            cluster_name,
            domain: cluster_domain,
            pod_subnets,
            service_subnets,
            ip_fabric_subnets,
            ip_fabric_forwarding,
            ip_fabric_snat,
            nested_mode,
            ip_fabric_network,
            cluster_network,
            flow_aging_ports,
        });

        let kube_cache = Cache::default();
        let vnc_cache = Cache::default();

        let mut prom = <Registry>::default();
        let reg = prom.sub_registry_with_prefix("network_manager");
        let metrics = Metrics::register(reg);
        metrics::register_cache_size(reg, kube_cache.clone(), vnc_cache.clone());
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let api: SharedApi = if dry_run {
            tracing::warn!("Provisioning against an in-memory network controller");
            Arc::new(MemoryApi::with_cluster_defaults(&config))
        } else {
            let connector = HttpConnector::new(&vnc_endpoint_ip, vnc_endpoint_port, auth_token);
            let connection = ConnectionManager::new(
                connector,
                Arc::new(LogReporter::default()),
                Duration::from_secs(connect_retry_interval),
            );
            let api = connection.connect().await;
            tokio::spawn({
                let api = api.clone();
                let cache = vnc_cache.clone();
                async move { connection.supervise(api, cache).await }
                    .instrument(info_span!("vnc"))
            });
            api
        };

        let synced = vnc::resync::full(api.as_ref(), &vnc_cache)
            .await
            .context("failed to resync with the network controller")?;
        info!(objects = synced, "Resynced with the network controller");

        let provisioned = Bootstrap::new(api.clone(), vnc_cache.clone(), config.clone())
            .with_domain_wait(Duration::from_secs(domain_wait_interval))
            .run()
            .await?;
        info!(nat_pools = ?provisioned.nat_pools, "Provisioned cluster networking");

        let ctx = Context {
            config,
            api,
            vnc_cache,
            kube_cache: kube_cache.clone(),
            labels: LabelCache::default(),
            provisioned: Arc::new(provisioned),
        };
        managers::tags::register(&ctx);
        let managers = managers::all(&ctx);

        // Spawn resource watches.

        let (tx, rx) = events::channel();

        let namespaces = runtime.watch_all::<k8s::Namespace>(watcher::Config::default());
        tokio::spawn(
            EventSource::new(tx.clone())
                .with_cache(kube_cache.clone())
                .run(namespaces)
                .instrument(info_span!("namespaces")),
        );

        let pods = runtime.watch_all::<k8s::Pod>(watcher::Config::default());
        tokio::spawn(
            EventSource::new(tx.clone())
                .with_cache(kube_cache.clone())
                .run(pods)
                .instrument(info_span!("pods")),
        );

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            EventSource::new(tx.clone())
                .with_cache(kube_cache.clone())
                .run(services)
                .instrument(info_span!("services")),
        );

        let network_policies = runtime.watch_all::<k8s::NetworkPolicy>(watcher::Config::default());
        tokio::spawn(
            EventSource::new(tx.clone())
                .with_cache(kube_cache.clone())
                .run(network_policies)
                .instrument(info_span!("networkpolicies")),
        );

        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        tokio::spawn(
            EventSource::new(tx.clone())
                .with_cache(kube_cache.clone())
                .run(ingresses)
                .instrument(info_span!("ingresses")),
        );

        let endpoints = runtime.watch_all::<k8s::Endpoints>(watcher::Config::default());
        tokio::spawn(
            EventSource::new(tx.clone())
                .with_cache(kube_cache.clone())
                .run(endpoints)
                .instrument(info_span!("endpoints")),
        );

        if api_resource_exists::<k8s::NetworkAttachmentDefinition>(&runtime.client()).await {
            let definitions =
                runtime.watch_all::<k8s::NetworkAttachmentDefinition>(watcher::Config::default());
            tokio::spawn(
                EventSource::new(tx.clone())
                    .with_cache(kube_cache.clone())
                    .run(definitions)
                    .instrument(info_span!("network-attachment-definitions.k8s.cni.cncf.io")),
            );
        } else {
            tracing::warn!(
                "network-attachment-definitions.k8s.cni.cncf.io resource kind not found, skipping watches"
            );
        }

        let mut reconciler = Reconciler::new(rx, managers, metrics);
        if kube_timer_interval > 0 {
            let period = Duration::from_secs(kube_timer_interval);
            tokio::spawn(
                events::sync_ticker(tx.clone(), ResourceKind::TIMED.to_vec(), period)
                    .instrument(info_span!("sync")),
            );
            reconciler = reconciler.with_idle_timeout(period);
        }
        drop(tx);

        let reconciler = tokio::spawn(reconciler.run().instrument(info_span!("reconcile")));

        // Block on the shutdown signal unless the reconciler stops first.
        tokio::select! {
            res = runtime.run() => {
                if res.is_err() {
                    bail!("Aborted");
                }
            }
            res = reconciler => match res {
                Ok(Ok(())) => bail!("Event sources terminated"),
                Ok(Err(fatal)) => return Err(fatal.into()),
                Err(error) => return Err(error).context("reconciler failed"),
            },
        }

        Ok(())
    }
}

#[derive(Clone, Debug)]
struct IpNets(Vec<IpNet>);

impl std::str::FromStr for IpNets {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(|n| n.parse().map_err(Into::into))
            .collect::<Result<Vec<IpNet>>>()
            .map(Self)
    }
}

/// The port of a `host:port` service address.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct HostPort(u16);

impl std::str::FromStr for HostPort {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        let (_, port) = s
            .rsplit_once(':')
            .with_context(|| format!("missing port in {s}"))?;
        let port = port
            .parse()
            .with_context(|| format!("invalid port in {s}"))?;
        Ok(Self(port))
    }
}

async fn api_resource_exists<T>(client: &Client) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    client
        .list_api_group_resources(&T::api_version(&dt))
        .await
        .ok()
        .iter()
        .flat_map(|r| r.resources.iter())
        .any(|r| r.kind == T::kind(&dt))
}
