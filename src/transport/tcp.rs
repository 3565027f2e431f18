//! TCP transport implementation
//!
//! Dials upstream proxies with a bounded connect timeout.

use super::SocketOpts;
use crate::error::{GatewayError, GatewayResult};
use crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// TCP transport for plain connections
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TcpTransport {
    /// Create a new TCP transport with default options
    pub fn with_defaults() -> Self {
        TcpTransport {
            socket_opts: SocketOpts::default(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Connection timeout in use
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect to `host:port`
    ///
    /// Failure to connect within the timeout, or a refused connection,
    /// is reported as [`GatewayError::Connect`].
    pub async fn connect(&self, host: &str, port: u16) -> GatewayResult<TcpStream> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| GatewayError::connect(format!("connection timeout to {}:{}", host, port)))?
            .map_err(|e| GatewayError::connect(format!("failed to connect to {}:{}: {}", host, port, e)))?;

        if let Err(e) = self.socket_opts.apply(&stream) {
            warn!("Failed to apply socket options: {}", e);
        }

        debug!("TCP connection established to {}:{}", host, port);

        Ok(stream)
    }
}
