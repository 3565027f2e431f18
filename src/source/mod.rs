//! Upstream proxy sources
//!
//! Collaborators that feed new upstream records into the pool: a remote
//! HTTP/JSON API and plain-text list files. They only ever talk to the
//! pool through [`ProxyPool::add`](crate::pool::ProxyPool::add) and
//! friends.

mod api;
mod loader;

pub use api::{parse_api_proxy, ApiSource};
pub use loader::{
    load_proxies_from_files, load_proxies_with_type, parse_proxy_line, FileWatchTask, LoadReport,
};

use crate::error::{GatewayError, GatewayResult};
use crate::helper::{PeriodicTask, RetryConfig};
use crate::pool::{ProxyPool, ProxyRecord};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A place fresh upstream proxies can be fetched from
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Fetch the current batch of upstream proxies
    async fn fetch_upstream_proxies(&self) -> GatewayResult<Vec<ProxyRecord>>;
}

/// Fetch from `source` and add the results to `pool`
///
/// Failed fetches are retried with exponential backoff according to
/// `retry`. Returns the number of records that were new to the pool.
pub async fn refresh_pool(
    pool: &ProxyPool,
    source: &dyn ProxySource,
    retry: &RetryConfig,
) -> GatewayResult<usize> {
    let mut attempt = 0;

    loop {
        match source.fetch_upstream_proxies().await {
            Ok(records) if records.is_empty() => {
                return Err(GatewayError::Source("source returned no proxies".to_string()));
            }
            Ok(records) => return Ok(pool.add_all(records).await),
            Err(e) if attempt < retry.max_retries => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    "Failed to fetch upstream proxies: {}. Retrying in {:?} (attempt {}/{})",
                    e,
                    delay,
                    attempt + 1,
                    retry.max_retries
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Periodic task refreshing the pool from a [`ProxySource`]
pub struct RefreshTask {
    pool: Arc<ProxyPool>,
    source: Arc<dyn ProxySource>,
    interval: Duration,
}

impl RefreshTask {
    /// Create a refresh task running every `interval`
    pub fn new(pool: Arc<ProxyPool>, source: Arc<dyn ProxySource>, interval: Duration) -> Self {
        RefreshTask {
            pool,
            source,
            interval,
        }
    }
}

#[async_trait]
impl PeriodicTask for RefreshTask {
    fn name(&self) -> &str {
        "proxy-refresh"
    }

    async fn next_delay(&self) -> Duration {
        self.interval
    }

    async fn run_once(&mut self) {
        let retry = RetryConfig::new(self.pool.max_retries().await);
        match refresh_pool(&self.pool, self.source.as_ref(), &retry).await {
            Ok(added) => info!(
                "Refreshed upstream proxies: {} new, pool size {}",
                added,
                self.pool.len().await
            ),
            Err(e) => warn!("Upstream proxy refresh failed: {}", e),
        }
    }
}
