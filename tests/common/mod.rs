//! Test utilities and mocks for Proxygate
//!
//! Listeners, a scriptable upstream SOCKS5 proxy and canned HTTP servers
//! shared by the integration tests.

#![allow(dead_code)]

use proxygate::config::PoolConfig;
use proxygate::pool::ProxyPool;
use proxygate::socks::{ChainClient, CredentialValidator, GatewayHandler, TargetAddr};
use proxygate::transport::SocketOpts;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Address nothing is listening on
pub async fn closed_addr() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Behaviour of a [`MockUpstream`]
#[derive(Debug, Clone, Default)]
pub struct UpstreamBehavior {
    /// Credentials the upstream insists on
    pub credentials: Option<(String, String)>,
    /// Status returned for CONNECT requests
    pub connect_status: u8,
}

/// Minimal SOCKS5 proxy: negotiates, records the CONNECT target, then echoes
pub struct MockUpstream {
    pub addr: SocketAddr,
    pub targets: Arc<Mutex<Vec<TargetAddr>>>,
}

impl MockUpstream {
    /// Start an upstream accepting anyone
    pub async fn start() -> Self {
        Self::start_with(UpstreamBehavior::default()).await
    }

    /// Start an upstream with the given behaviour
    pub async fn start_with(behavior: UpstreamBehavior) -> Self {
        let (listener, addr) = create_test_listener().await;
        let targets = Arc::new(Mutex::new(Vec::new()));

        let seen = targets.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let behavior = behavior.clone();
                let seen = seen.clone();
                tokio::spawn(async move {
                    let _ = serve_upstream(stream, behavior, seen).await;
                });
            }
        });

        MockUpstream { addr, targets }
    }

    /// Record URL pointing at this upstream
    pub fn url(&self) -> String {
        format!("socks5://{}", self.addr)
    }

    /// Targets requested so far
    pub fn targets(&self) -> Vec<TargetAddr> {
        self.targets.lock().unwrap().clone()
    }
}

async fn serve_upstream(
    mut stream: TcpStream,
    behavior: UpstreamBehavior,
    seen: Arc<Mutex<Vec<TargetAddr>>>,
) -> std::io::Result<()> {
    let mut head = [0u8; 2];
    stream.read_exact(&mut head).await?;
    let mut methods = vec![0u8; head[1] as usize];
    stream.read_exact(&mut methods).await?;

    match &behavior.credentials {
        Some((user, pass)) => {
            if !methods.contains(&0x02) {
                stream.write_all(&[0x05, 0xFF]).await?;
                return Ok(());
            }
            stream.write_all(&[0x05, 0x02]).await?;

            let ver = stream.read_u8().await?;
            let ulen = stream.read_u8().await? as usize;
            let mut username = vec![0u8; ulen];
            stream.read_exact(&mut username).await?;
            let plen = stream.read_u8().await? as usize;
            let mut password = vec![0u8; plen];
            stream.read_exact(&mut password).await?;

            if ver != 0x01 || username != user.as_bytes() || password != pass.as_bytes() {
                stream.write_all(&[0x01, 0x01]).await?;
                return Ok(());
            }
            stream.write_all(&[0x01, 0x00]).await?;
        }
        None => stream.write_all(&[0x05, 0x00]).await?,
    }

    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;
    let target = TargetAddr::read_from(&mut stream, header[3])
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    seen.lock().unwrap().push(target);

    let mut reply = vec![0x05, behavior.connect_status, 0x00, 0x01, 10, 0, 0, 1];
    reply.extend_from_slice(&4321u16.to_be_bytes());
    stream.write_all(&reply).await?;
    if behavior.connect_status != 0x00 {
        return Ok(());
    }

    let (mut reader, mut writer) = stream.split();
    tokio::io::copy(&mut reader, &mut writer).await?;
    Ok(())
}

/// Running gateway listener
pub struct TestGateway {
    pub addr: SocketAddr,
    pub pool: Arc<ProxyPool>,
    shutdown: broadcast::Sender<bool>,
}

impl TestGateway {
    /// Start a gateway over `pool`
    pub async fn start(pool: Arc<ProxyPool>) -> Self {
        Self::start_with(pool, None).await
    }

    /// Start a gateway over `pool` with optional client authentication
    pub async fn start_with(
        pool: Arc<ProxyPool>,
        validator: Option<Arc<dyn CredentialValidator>>,
    ) -> Self {
        let (listener, addr) = create_test_listener().await;
        let (shutdown, rx) = broadcast::channel(1);

        let mut handler = GatewayHandler::new(pool.clone(), ChainClient::default());
        if let Some(validator) = validator {
            handler = handler.with_validator(validator);
        }

        tokio::spawn(proxygate::server::serve(
            listener,
            Arc::new(handler),
            SocketOpts::default(),
            rx,
        ));

        TestGateway {
            addr,
            pool,
            shutdown,
        }
    }

    /// Connect a plain TCP client
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
    }
}

/// Empty pool with default settings
pub fn empty_pool() -> Arc<ProxyPool> {
    Arc::new(ProxyPool::new(PoolConfig::default()))
}

/// HTTP server answering every request with `status` and `body`
pub async fn spawn_http_server(status: &'static str, body: String) -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });
    addr
}

/// Mock SOCKS5 client messages
pub mod socks5_mock {
    use proxygate::socks::*;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a password auth method selection request
    pub fn create_auth_request_password() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_PASSWORD]
    }

    /// Create an RFC 1929 credentials message
    pub fn create_credentials(username: &str, password: &str) -> Vec<u8> {
        let mut msg = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        msg.extend_from_slice(username.as_bytes());
        msg.push(password.len() as u8);
        msg.extend_from_slice(password.as_bytes());
        msg
    }

    /// Create a connect command to IPv4 address
    pub fn create_connect_ipv4(ip: [u8; 4], port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_IPV4,
        ];
        cmd.extend_from_slice(&ip);
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}
