//! Pool health checking
//!
//! A sweep snapshots the pool, probes every record through itself with
//! the pool lock released, applies the outcomes and finally evicts the
//! records whose fail count reached the threshold.

use super::manager::ProxyPool;
use super::record::ProxyRecord;
use crate::helper::PeriodicTask;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Checks whether an upstream can reach a test endpoint
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// `true` when a request through `record` to `test_url` succeeded
    async fn probe(&self, record: &ProxyRecord, test_url: &str, timeout: Duration) -> bool;
}

/// Probe issuing an HTTP GET through the upstream; any 2xx status passes
#[derive(Debug, Default, Clone)]
pub struct HttpProbe;

impl HttpProbe {
    async fn request(record: &ProxyRecord, test_url: &str, timeout: Duration) -> anyhow::Result<u16> {
        let proxy = reqwest::Proxy::all(record.proxy_url()?)?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .build()?;
        let response = client.get(test_url).send().await?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn probe(&self, record: &ProxyRecord, test_url: &str, timeout: Duration) -> bool {
        match Self::request(record, test_url, timeout).await {
            Ok(status) if (200..300).contains(&status) => true,
            Ok(status) => {
                debug!("Health check for {} returned status {}", record.url, status);
                false
            }
            Err(e) => {
                debug!("Health check for {} failed: {:#}", record.url, e);
                false
            }
        }
    }
}

/// Outcome of one health sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Records probed
    pub checked: usize,
    /// Probes that passed
    pub healthy: usize,
    /// Probes that failed
    pub failed: usize,
    /// URLs removed after the sweep
    pub evicted: Vec<String>,
}

/// Run one health sweep over `pool`
///
/// Records already at the fail threshold are not probed again; they are
/// evicted at the end of this sweep.
pub async fn check_all(pool: &ProxyPool, probe: Arc<dyn HealthProbe>) -> SweepReport {
    let settings = pool.settings().await;
    let timeout = settings.probe_timeout();
    let snapshot = pool.snapshot().await;

    let mut probes = JoinSet::new();
    for record in snapshot
        .into_iter()
        .filter(|r| r.fail_count < settings.fail_threshold)
    {
        let probe = probe.clone();
        let test_url = settings.test_url.clone();
        probes.spawn(async move {
            let healthy = probe.probe(&record, &test_url, timeout).await;
            (record.url, healthy)
        });
    }

    let mut report = SweepReport::default();
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((url, healthy)) => {
                pool.record_check(&url, healthy).await;
                report.checked += 1;
                if healthy {
                    report.healthy += 1;
                } else {
                    report.failed += 1;
                }
            }
            Err(e) => warn!("Health probe task failed: {}", e),
        }
    }

    report.evicted = pool.evict_failed().await;
    report
}

/// Periodic task running [`check_all`] at the pool's check interval
pub struct HealthCheckTask {
    pool: Arc<ProxyPool>,
    probe: Arc<dyn HealthProbe>,
}

impl HealthCheckTask {
    /// Create a health check task using `probe`
    pub fn new(pool: Arc<ProxyPool>, probe: Arc<dyn HealthProbe>) -> Self {
        HealthCheckTask { pool, probe }
    }
}

#[async_trait]
impl PeriodicTask for HealthCheckTask {
    fn name(&self) -> &str {
        "health-check"
    }

    async fn next_delay(&self) -> Duration {
        self.pool.check_interval().await
    }

    async fn run_once(&mut self) {
        let report = check_all(&self.pool, self.probe.clone()).await;
        info!(
            "Health check complete: {} checked, {} healthy, {} failed, {} evicted",
            report.checked,
            report.healthy,
            report.failed,
            report.evicted.len()
        );
        self.pool.stats().log_health(self.pool.len().await);
    }
}
