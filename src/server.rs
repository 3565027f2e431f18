//! Gateway listener
//!
//! Accepts inbound connections and runs each one in its own task until
//! the shutdown broadcast fires.

use crate::config::ServerConfig;
use crate::socks::GatewayHandler;
use crate::transport::SocketOpts;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Inbound SOCKS5 gateway server
pub struct Server {
    config: ServerConfig,
    handler: Arc<GatewayHandler>,
}

impl Server {
    /// Create a server dispatching connections to `handler`
    pub fn new(config: ServerConfig, handler: Arc<GatewayHandler>) -> Self {
        Server { config, handler }
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self, shutdown_rx: broadcast::Receiver<bool>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.listen_addr))?;

        info!("SOCKS5 gateway listening on {}", listener.local_addr()?);

        let opts = SocketOpts::from_tcp_config(&self.config.tcp);
        serve(listener, self.handler, opts, shutdown_rx).await
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// Accept loop on an already bound listener
pub async fn serve(
    listener: TcpListener,
    handler: Arc<GatewayHandler>,
    opts: SocketOpts,
    mut shutdown_rx: broadcast::Receiver<bool>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                if let Err(e) = opts.apply(&stream) {
                    debug!("Failed to apply socket options for {}: {}", peer, e);
                }

                debug!("New connection from {}", peer);
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler.handle(stream).await {
                        error!("Session from {} failed: {}", peer, e);
                    }
                });
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping listener");
                break;
            }
        }
    }

    Ok(())
}
