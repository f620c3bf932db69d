use crate::resync;
use kube_network_manager_cache::Cache;
use kube_network_manager_core::{
    health::{ConnectionInfo, ConnectionStatus, ConnectionType, HealthReporter},
    ApiError, SharedApi, VncApi, VncKind,
};
use std::sync::Arc;
use tokio::time;

/// Opens a session with the network controller.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<SharedApi, ApiError>;

    /// The endpoints being connected to, for status reports.
    fn endpoints(&self) -> Vec<String>;
}

/// Establishes a controller session, retrying until it succeeds, and then
/// watches it.
///
/// Every attempt is reported: `INIT` before the first attempt, `DOWN` after
/// each failure, and `UP` once a session is established.
pub struct ConnectionManager<C> {
    connector: C,
    health: Arc<dyn HealthReporter>,
    retry_interval: time::Duration,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        health: Arc<dyn HealthReporter>,
        retry_interval: time::Duration,
    ) -> Self {
        Self {
            connector,
            health,
            retry_interval,
        }
    }

    pub async fn connect(&self) -> SharedApi {
        self.report(ConnectionStatus::Init, String::new());

        let mut attempts = 0usize;
        loop {
            attempts += 1;
            match self.connector.connect().await {
                Ok(api) => {
                    tracing::info!(attempts, "Connected to the network controller");
                    self.report(ConnectionStatus::Up, String::new());
                    return api;
                }
                Err(error) => {
                    if error.is_transient() {
                        tracing::warn!(
                            %error,
                            attempts,
                            "Failed to connect to the network controller"
                        );
                    } else {
                        tracing::error!(
                            %error,
                            attempts,
                            "Network controller rejected the connection"
                        );
                    }
                    self.report(ConnectionStatus::Down, error.to_string());
                }
            }
            time::sleep(self.retry_interval).await;
        }
    }

    /// Pings an established session every retry interval.
    ///
    /// When the controller stops answering, `DOWN` is reported. Once it
    /// answers again, the controller object cache is reset and reloaded
    /// before `UP` is reported, since changes made in the meantime were not
    /// observed.
    pub async fn supervise(&self, api: SharedApi, cache: Cache<VncKind>) {
        let mut down = false;
        loop {
            time::sleep(self.retry_interval).await;
            match api.ping().await {
                Ok(()) if down => match Self::resync(api.as_ref(), &cache).await {
                    Ok(objects) => {
                        tracing::info!(objects, "Reconnected to the network controller");
                        self.report(ConnectionStatus::Up, String::new());
                        down = false;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "Failed to resync with the network controller");
                    }
                },
                Ok(()) => {}
                Err(error) => {
                    if !down {
                        tracing::warn!(%error, "Lost the network controller connection");
                        self.report(ConnectionStatus::Down, error.to_string());
                        down = true;
                    }
                }
            }
        }
    }

    async fn resync(api: &dyn VncApi, cache: &Cache<VncKind>) -> Result<usize, ApiError> {
        resync::reset(cache);
        resync::full(api, cache).await
    }

    fn report(&self, status: ConnectionStatus, message: String) {
        self.health.report(ConnectionInfo {
            conn_type: ConnectionType::ApiServer,
            name: "ApiServer".to_string(),
            status,
            message,
            endpoints: self.connector.endpoints(),
        });
    }
}

impl<C> std::fmt::Debug for ConnectionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("retry_interval", &self.retry_interval)
            .finish()
    }
}
