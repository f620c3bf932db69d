use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    ApiServer,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Init,
    Up,
    Down,
}

/// A connection status update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub conn_type: ConnectionType,
    pub name: String,
    pub status: ConnectionStatus,
    pub message: String,
    pub endpoints: Vec<String>,
}

/// Receives connection status updates. Reports are fire-and-forget.
pub trait HealthReporter: Send + Sync + 'static {
    fn report(&self, info: ConnectionInfo);
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Init => "INIT",
            Self::Up => "UP",
            Self::Down => "DOWN",
        })
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ApiServer => "ApiServer",
        })
    }
}
