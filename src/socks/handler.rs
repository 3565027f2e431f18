//! SOCKS5 gateway connection handler
//!
//! Drives one inbound client connection from greeting to relay: method
//! negotiation, CONNECT parsing, upstream selection, chaining and
//! finally the tunnel relay.

use super::auth::{negotiate, CredentialValidator};
use super::client::ChainClient;
use super::command::{build_reply, parse_command};
use super::relay::relay_tcp;
use crate::error::{GatewayError, GatewayResult, Socks5ReplyCode};
use crate::pool::{ProxyPool, ProxyType};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

/// Per-connection SOCKS5 gateway logic shared by all sessions
pub struct GatewayHandler {
    pool: Arc<ProxyPool>,
    chain: ChainClient,
    validator: Option<Arc<dyn CredentialValidator>>,
}

impl GatewayHandler {
    /// Create a handler selecting upstreams from `pool`
    pub fn new(pool: Arc<ProxyPool>, chain: ChainClient) -> Self {
        GatewayHandler {
            pool,
            chain,
            validator: None,
        }
    }

    /// Require clients to authenticate against `validator`
    pub fn with_validator(mut self, validator: Arc<dyn CredentialValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Pool used for upstream selection
    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Serve one client connection to completion
    ///
    /// Every failure before the tunnel is up is answered with the closest
    /// SOCKS5 reply code (best effort) and returned. Relay-phase errors
    /// are only logged.
    pub async fn handle<S>(&self, mut stream: S) -> GatewayResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        negotiate(&mut stream, self.validator.as_deref()).await?;

        let target = match parse_command(&mut stream).await {
            Ok(target) => target,
            Err(e) => {
                if !matches!(e, GatewayError::Network(_)) {
                    send_failure(&mut stream, e.reply_code()).await;
                }
                return Err(e);
            }
        };

        let record = match self.pool.select_for_type(ProxyType::Socks5).await {
            Ok(record) => record,
            Err(e) => {
                warn!("No upstream for {}: {}", target, e);
                send_failure(&mut stream, Socks5ReplyCode::GeneralFailure).await;
                return Err(e);
            }
        };

        let upstream = match self.chain.connect(&record, &target).await {
            Ok(upstream) => upstream,
            Err(e) => {
                warn!("Chaining to {} via {} failed: {}", target, record.url, e);
                if e.is_upstream_failure() {
                    self.pool.mark_failure(&record).await;
                }
                send_failure(&mut stream, e.reply_code()).await;
                return Err(e);
            }
        };

        self.pool.mark_success(&record).await;

        build_reply(&mut stream, Socks5ReplyCode::Succeeded, upstream.peer_addr().ok()).await?;
        info!("Tunnel established to {} via {}", target, record.url);

        let stats = relay_tcp(stream, upstream).await;
        debug!(
            "Tunnel to {} closed: {} bytes sent, {} bytes received",
            target, stats.client_to_upstream, stats.upstream_to_client
        );

        Ok(())
    }
}

/// Best-effort error reply; the connection is closed right after
async fn send_failure<S>(stream: &mut S, code: Socks5ReplyCode)
where
    S: AsyncWrite + Unpin,
{
    if let Err(e) = build_reply(stream, code, None).await {
        debug!("Failed to send SOCKS5 error reply: {}", e);
    }
}
