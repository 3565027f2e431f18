//! Gateway assembly
//!
//! Wires the pool, its sources, the background tasks and the listener
//! together from a loaded [`Config`].

use crate::config::Config;
use crate::helper::{spawn_periodic, RetryConfig};
use crate::pool::{HealthCheckTask, HttpProbe, ProxyPool};
use crate::server::Server;
use crate::socks::{ChainClient, GatewayHandler, StaticCredentials};
use crate::source::{
    load_proxies_from_files, refresh_pool, ApiSource, FileWatchTask, ProxySource, RefreshTask,
};
use crate::transport::{SocketOpts, TcpTransport};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Build the API source when one is configured
pub fn build_source(config: &Config) -> Result<Option<Arc<dyn ProxySource>>> {
    let Some(url) = &config.source.api_url else {
        return Ok(None);
    };

    let source: Arc<dyn ProxySource> =
        Arc::new(ApiSource::new(url.clone()).context("Failed to create API source")?);
    info!("Using upstream API at {}", url);
    Ok(Some(source))
}

/// Run the gateway until `shutdown_tx` fires
pub async fn run_gateway(config: Config, shutdown_tx: broadcast::Sender<bool>) -> Result<()> {
    let source = build_source(&config)?;

    let mut pool = ProxyPool::new(config.pool.clone());
    if let Some(source) = &source {
        pool = pool.with_source(source.clone());
    }
    let pool = Arc::new(pool);

    if config.source.has_files() {
        load_proxies_from_files(
            config.source.http_file.as_deref(),
            config.source.socks5_file.as_deref(),
            &pool,
        )
        .await?;
    }

    let mut tasks = Vec::new();

    if let Some(source) = &source {
        let retry = RetryConfig::new(config.pool.max_retries);
        match refresh_pool(&pool, source.as_ref(), &retry).await {
            Ok(added) => info!("Initial fetch added {} upstream proxies", added),
            Err(e) => warn!("Initial upstream fetch failed: {}", e),
        }

        tasks.push(spawn_periodic(
            RefreshTask::new(pool.clone(), source.clone(), config.source.refresh_every()),
            shutdown_tx.subscribe(),
        ));
    }

    if config.source.has_files() {
        let watcher = FileWatchTask::new(
            pool.clone(),
            config.source.http_file.clone(),
            config.source.socks5_file.clone(),
            config.source.watch_every(),
        )
        .await;
        tasks.push(spawn_periodic(watcher, shutdown_tx.subscribe()));
    }

    tasks.push(spawn_periodic(
        HealthCheckTask::new(pool.clone(), Arc::new(HttpProbe)),
        shutdown_tx.subscribe(),
    ));

    let opts = SocketOpts::from_tcp_config(&config.server.tcp);
    let chain = ChainClient::new(TcpTransport::with_defaults().with_socket_opts(opts));
    let mut handler = GatewayHandler::new(pool.clone(), chain);
    if let Some(creds) = StaticCredentials::from_config(&config.server.socks) {
        info!("Client authentication enabled");
        handler = handler.with_validator(Arc::new(creds));
    }

    info!("Pool ready with {} upstream proxies", pool.len().await);

    let result = Server::new(config.server, Arc::new(handler))
        .run(shutdown_tx.subscribe())
        .await;

    // Listener is gone; make sure background tasks stop too
    let _ = shutdown_tx.send(true);
    for task in tasks {
        let _ = task.await;
    }

    pool.stats().log_health(pool.len().await);
    result
}
