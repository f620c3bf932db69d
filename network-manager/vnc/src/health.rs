//! Connection status reporters.

use kube_network_manager_core::health::{ConnectionInfo, ConnectionStatus, HealthReporter};

/// Logs each connection status update.
#[derive(Clone, Debug, Default)]
pub struct LogReporter(());

// === impl LogReporter ===

impl HealthReporter for LogReporter {
    fn report(&self, info: ConnectionInfo) {
        let ConnectionInfo {
            conn_type,
            name,
            status,
            message,
            endpoints,
        } = info;
        match status {
            ConnectionStatus::Down => tracing::warn!(
                %conn_type,
                %name,
                %status,
                ?endpoints,
                %message,
                "Connection status"
            ),
            _ => tracing::info!(%conn_type, %name, %status, ?endpoints, "Connection status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube_network_manager_core::health::ConnectionType;

    fn info(status: ConnectionStatus) -> ConnectionInfo {
        ConnectionInfo {
            conn_type: ConnectionType::ApiServer,
            name: "ApiServer".to_string(),
            status,
            message: String::new(),
            endpoints: vec!["10.0.0.1:8082".to_string()],
        }
    }

    #[test]
    fn reports_every_status() {
        let _trace = tracing::subscriber::set_default(
            tracing_subscriber::fmt().with_test_writer().finish(),
        );
        let reporter = LogReporter::default();
        for status in [
            ConnectionStatus::Init,
            ConnectionStatus::Down,
            ConnectionStatus::Up,
        ] {
            reporter.report(info(status));
        }
    }
}
