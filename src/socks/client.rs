//! Upstream chaining client
//!
//! Opens a tunnel to the final destination through one upstream SOCKS5
//! proxy: dial, method negotiation, optional RFC 1929 credentials and a
//! CONNECT request. The client never retries on another record; the
//! caller decides what a failure means for the pool.

use super::consts::*;
use super::types::TargetAddr;
use crate::error::{GatewayError, GatewayResult};
use crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::pool::ProxyRecord;
use crate::transport::TcpTransport;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Client establishing tunnels through upstream SOCKS5 proxies
#[derive(Debug, Clone)]
pub struct ChainClient {
    transport: TcpTransport,
    handshake_timeout: Duration,
}

impl Default for ChainClient {
    fn default() -> Self {
        ChainClient::new(TcpTransport::with_defaults())
    }
}

impl ChainClient {
    /// Create a client dialing through `transport`
    pub fn new(transport: TcpTransport) -> Self {
        ChainClient {
            transport,
            handshake_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }

    /// Bound the whole handshake by `timeout`
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Connect to `target` through `record`
    ///
    /// Returns the upstream connection positioned right after the
    /// upstream's CONNECT reply, ready for relaying.
    pub async fn connect(&self, record: &ProxyRecord, target: &TargetAddr) -> GatewayResult<TcpStream> {
        let (host, port) = record.endpoint()?;
        let mut stream = self.transport.connect(&host, port).await?;

        let bound = tokio::time::timeout(
            self.handshake_timeout,
            handshake(&mut stream, record.credentials(), target),
        )
        .await
        .map_err(|_| {
            GatewayError::Timeout(format!("handshake with upstream {} timed out", record.url))
        })??;

        debug!(
            "Tunnel to {} established via {} (bound {})",
            target, record.url, bound
        );
        Ok(stream)
    }
}

/// Run the client side of a SOCKS5 handshake on `stream`
///
/// Returns the bound address reported by the upstream.
pub async fn handshake<S>(
    stream: &mut S,
    credentials: Option<(&str, &str)>,
    target: &TargetAddr,
) -> GatewayResult<TargetAddr>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let greeting: &[u8] = match credentials {
        Some(_) => &[
            SOCKS5_VERSION,
            2,
            SOCKS5_AUTH_METHOD_NONE,
            SOCKS5_AUTH_METHOD_PASSWORD,
        ],
        None => &[SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE],
    };
    stream.write_all(greeting).await?;
    stream.flush().await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != SOCKS5_VERSION {
        return Err(GatewayError::connect(format!(
            "upstream answered with SOCKS version {}",
            choice[0]
        )));
    }

    match (choice[1], credentials) {
        (SOCKS5_AUTH_METHOD_NONE, _) => {}
        (SOCKS5_AUTH_METHOD_PASSWORD, Some((username, password))) => {
            send_credentials(stream, username, password).await?;
        }
        (SOCKS5_AUTH_METHOD_PASSWORD, None) => {
            return Err(GatewayError::Auth(
                "upstream requires credentials but none are configured".to_string(),
            ));
        }
        (method, _) => {
            return Err(GatewayError::Auth(format!(
                "upstream selected unsupported auth method {:#04x}",
                method
            )));
        }
    }

    let mut request = vec![SOCKS5_VERSION, SOCKS5_CMD_TCP_CONNECT, SOCKS5_RESERVED];
    request.extend_from_slice(&target.to_bytes());
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let [version, status, _reserved, addr_type] = header;

    if version != SOCKS5_VERSION {
        return Err(GatewayError::connect(format!(
            "upstream CONNECT reply has SOCKS version {}",
            version
        )));
    }

    if status != 0x00 {
        return Err(GatewayError::Connect {
            reason: format!("upstream refused CONNECT to {} with status {:#04x}", target, status),
            code: Some(status),
        });
    }

    TargetAddr::read_from(stream, addr_type)
        .await
        .map_err(|e| match e {
            GatewayError::AddressTypeNotSupported(atyp) => GatewayError::connect(format!(
                "upstream reply uses unknown address type {:#04x}",
                atyp
            )),
            other => other,
        })
}

/// RFC 1929 sub-negotiation, client side
async fn send_credentials<S>(stream: &mut S, username: &str, password: &str) -> GatewayResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if username.len() > 255 || password.len() > 255 {
        return Err(GatewayError::Auth(
            "upstream credentials longer than 255 bytes".to_string(),
        ));
    }

    let mut request = Vec::with_capacity(3 + username.len() + password.len());
    request.push(SOCKS5_AUTH_VERSION);
    request.push(username.len() as u8);
    request.extend_from_slice(username.as_bytes());
    request.push(password.len() as u8);
    request.extend_from_slice(password.as_bytes());
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status != [SOCKS5_AUTH_VERSION, SOCKS5_AUTH_SUCCESS] {
        return Err(GatewayError::Auth(format!(
            "upstream rejected credentials for {}",
            username
        )));
    }

    Ok(())
}
