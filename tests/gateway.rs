//! End-to-end tests driving the gateway over real sockets

mod common;

use common::socks5_mock::*;
use common::*;
use proxygate::pool::{ProxyPool, ProxyRecord, ProxyType};
use proxygate::socks::{StaticCredentials, TargetAddr};
use proxygate::config::PoolConfig;
use proxygate::helper::RetryConfig;
use proxygate::source::{load_proxies_from_files, refresh_pool, ApiSource, ProxySource};
use std::io::Write;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const GENERAL_FAILURE: [u8; 10] = [0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0];

async fn greet(client: &mut TcpStream) {
    client.write_all(&create_auth_request_no_auth()).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x00]);
}

async fn read_reply(client: &mut TcpStream) -> [u8; 10] {
    let mut reply = [0u8; 10];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .expect("no reply from gateway")
        .unwrap();
    reply
}

fn success_reply(port: u16) -> [u8; 10] {
    let p = port.to_be_bytes();
    [0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, p[0], p[1]]
}

async fn assert_echo(client: &mut TcpStream) {
    client.write_all(b"ping through the chain").await.unwrap();
    let mut echoed = [0u8; 22];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut echoed))
        .await
        .expect("relay stalled")
        .unwrap();
    assert_eq!(&echoed, b"ping through the chain");
}

#[tokio::test]
async fn test_connect_through_upstream_and_relay() {
    let upstream = MockUpstream::start().await;
    let pool = empty_pool();
    pool.add(ProxyRecord::new(upstream.url(), ProxyType::Socks5)).await;
    let gateway = TestGateway::start(pool).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client).await, success_reply(upstream.addr.port()));
    assert_echo(&mut client).await;

    assert_eq!(
        upstream.targets(),
        vec![TargetAddr::Domain("example.com".to_string(), 443)]
    );

    let record = gateway.pool.get(&upstream.url()).await.unwrap();
    assert_eq!(record.fail_count, 0);
    assert!(record.last_used.is_some());
    assert_eq!(gateway.pool.stats().snapshot().total_succeeded, 1);
}

#[tokio::test]
async fn test_connect_ipv4_with_upstream_credentials() {
    let upstream = MockUpstream::start_with(UpstreamBehavior {
        credentials: Some(("alice".to_string(), "s3cret".to_string())),
        ..Default::default()
    })
    .await;
    let pool = empty_pool();
    pool.add(ProxyRecord::new(upstream.url(), ProxyType::Socks5).with_credentials("alice", "s3cret"))
        .await;
    let gateway = TestGateway::start(pool).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_ipv4([93, 184, 216, 34], 80))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client).await, success_reply(upstream.addr.port()));
    assert_echo(&mut client).await;
    assert_eq!(
        upstream.targets(),
        vec![TargetAddr::ipv4(Ipv4Addr::new(93, 184, 216, 34), 80)]
    );
}

#[tokio::test]
async fn test_no_socks5_upstream_general_failure() {
    let pool = empty_pool();
    pool.add(ProxyRecord::new("http://127.0.0.1:3128", ProxyType::Http)).await;
    let gateway = TestGateway::start(pool).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client).await, GENERAL_FAILURE);
}

#[tokio::test]
async fn test_upstream_rejects_credentials() {
    let upstream = MockUpstream::start_with(UpstreamBehavior {
        credentials: Some(("alice".to_string(), "s3cret".to_string())),
        ..Default::default()
    })
    .await;
    let pool = empty_pool();
    pool.add(ProxyRecord::new(upstream.url(), ProxyType::Socks5).with_credentials("alice", "wrong"))
        .await;
    let gateway = TestGateway::start(pool).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();

    assert_eq!(read_reply(&mut client).await, GENERAL_FAILURE);

    let record = gateway.pool.get(&upstream.url()).await.unwrap();
    assert_eq!(record.fail_count, 1);
    assert!(!record.is_working);
    assert!(upstream.targets().is_empty());
}

#[tokio::test]
async fn test_upstream_refusal_code_is_forwarded() {
    let upstream = MockUpstream::start_with(UpstreamBehavior {
        connect_status: 0x05,
        ..Default::default()
    })
    .await;
    let pool = empty_pool();
    pool.add(ProxyRecord::new(upstream.url(), ProxyType::Socks5)).await;
    let gateway = TestGateway::start(pool).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();

    let reply = read_reply(&mut client).await;
    assert_eq!(reply[1], 0x05);
    assert_eq!(gateway.pool.get(&upstream.url()).await.unwrap().fail_count, 1);
}

#[tokio::test]
async fn test_dead_upstream_marked_failed() {
    let dead = closed_addr().await;
    let url = format!("socks5://{}", dead);
    let pool = empty_pool();
    pool.add(ProxyRecord::new(url.clone(), ProxyType::Socks5)).await;
    let gateway = TestGateway::start(pool).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();

    let reply = read_reply(&mut client).await;
    assert_ne!(reply[1], 0x00);
    assert_eq!(gateway.pool.get(&url).await.unwrap().fail_count, 1);
}

#[tokio::test]
async fn test_unsupported_command() {
    let gateway = TestGateway::start(empty_pool()).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    // The address is never read for rejected commands
    client.write_all(&[0x05, 0x03, 0x00, 0x01]).await.unwrap();

    let reply = read_reply(&mut client).await;
    assert_eq!(reply[..2], [0x05, 0x07]);
}

#[tokio::test]
async fn test_unsupported_address_type() {
    let gateway = TestGateway::start(empty_pool()).await;

    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client.write_all(&[0x05, 0x01, 0x00, 0x09]).await.unwrap();

    let reply = read_reply(&mut client).await;
    assert_eq!(reply[..2], [0x05, 0x08]);
}

#[tokio::test]
async fn test_client_authentication() {
    let upstream = MockUpstream::start().await;
    let pool = empty_pool();
    pool.add(ProxyRecord::new(upstream.url(), ProxyType::Socks5)).await;
    let gateway =
        TestGateway::start_with(pool, Some(Arc::new(StaticCredentials::new("bob", "hunter2"))))
            .await;

    // Clients offering only "no auth" are turned away
    let mut client = gateway.connect().await;
    client.write_all(&create_auth_request_no_auth()).await.unwrap();
    let mut reply = [0u8; 2];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0xFF]);

    // Wrong password
    let mut client = gateway.connect().await;
    client.write_all(&create_auth_request_password()).await.unwrap();
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);
    client.write_all(&create_credentials("bob", "nope")).await.unwrap();
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x01, 0x01]);

    // Correct credentials get a tunnel
    let mut client = gateway.connect().await;
    client.write_all(&create_auth_request_password()).await.unwrap();
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x05, 0x02]);
    client.write_all(&create_credentials("bob", "hunter2")).await.unwrap();
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [0x01, 0x00]);
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();
    assert_eq!(read_reply(&mut client).await, success_reply(upstream.addr.port()));
    assert_echo(&mut client).await;
}

#[tokio::test]
async fn test_fairness_across_upstreams() {
    let first = MockUpstream::start().await;
    let second = MockUpstream::start().await;
    let pool = empty_pool();
    pool.add(ProxyRecord::new(first.url(), ProxyType::Socks5)).await;
    pool.add(ProxyRecord::new(second.url(), ProxyType::Socks5)).await;
    let gateway = TestGateway::start(pool).await;

    for _ in 0..2 {
        let mut client = gateway.connect().await;
        greet(&mut client).await;
        client
            .write_all(&create_connect_domain("example.com", 443))
            .await
            .unwrap();
        assert_eq!(read_reply(&mut client).await[1], 0x00);
    }

    assert_eq!(first.targets().len(), 1);
    assert_eq!(second.targets().len(), 1);
}

#[tokio::test]
async fn test_pool_loaded_from_files_serves_clients() {
    let upstream = MockUpstream::start().await;

    let mut socks5 = tempfile::NamedTempFile::new().unwrap();
    writeln!(socks5, "# upstreams").unwrap();
    writeln!(socks5, "1.2.3.4:99999:user").unwrap();
    writeln!(socks5, "{}", upstream.addr).unwrap();

    let pool = empty_pool();
    let report = load_proxies_from_files(None, Some(socks5.path()), &pool)
        .await
        .unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(pool.len().await, 1);

    let gateway = TestGateway::start(pool).await;
    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();
    assert_eq!(read_reply(&mut client).await, success_reply(upstream.addr.port()));
    assert_echo(&mut client).await;
}

#[tokio::test]
async fn test_api_sourced_upstream_serves_clients() {
    let upstream = MockUpstream::start_with(UpstreamBehavior {
        credentials: Some(("apiuser".to_string(), "apipass".to_string())),
        ..Default::default()
    })
    .await;

    let body = format!(
        r#"{{"proxyData":{{"proxyhttp":"127.0.0.1:3128:apiuser:apipass","proxysocks5":"127.0.0.1:{}:apiuser:apipass"}}}}"#,
        upstream.addr.port()
    );
    let api = spawn_http_server("200 OK", body).await;

    let source: Arc<dyn ProxySource> = Arc::new(
        ApiSource::new(format!("http://{}/api/proxy/random", api))
            .unwrap()
            .with_min_interval(Duration::from_millis(10)),
    );
    let pool = Arc::new(ProxyPool::new(PoolConfig::default()).with_source(source.clone()));

    let added = refresh_pool(&pool, source.as_ref(), &RetryConfig::new(1))
        .await
        .unwrap();
    assert_eq!(added, 2);

    let gateway = TestGateway::start(pool).await;
    let mut client = gateway.connect().await;
    greet(&mut client).await;
    client
        .write_all(&create_connect_domain("example.com", 443))
        .await
        .unwrap();
    assert_eq!(read_reply(&mut client).await, success_reply(upstream.addr.port()));
    assert_echo(&mut client).await;
}
