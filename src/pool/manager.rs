//! Upstream proxy pool
//!
//! Owns the record collection together with the fairness bookkeeping and
//! the per-type fetch cache. Every piece of state lives behind a single
//! reader/writer lock which is only held for bookkeeping; network calls
//! (fetches, probes) always happen with the lock released.

use super::record::{ProxyRecord, ProxyType};
use super::stats::PoolStats;
use crate::config::PoolConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::source::ProxySource;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Maximum age of a cached fetch result used when the source is down
pub const CACHE_MAX_AGE: Duration = Duration::from_secs(30);

/// A fetched record remembered per proxy type
#[derive(Debug, Clone)]
struct CachedRecord {
    record: ProxyRecord,
    fetched_at: Instant,
}

/// Everything guarded by the pool lock
#[derive(Debug)]
struct PoolState {
    records: Vec<ProxyRecord>,
    last_selected: HashMap<String, Instant>,
    cache: HashMap<ProxyType, CachedRecord>,
    settings: PoolConfig,
}

impl PoolState {
    fn position(&self, url: &str) -> Option<usize> {
        self.records.iter().position(|r| r.url == url)
    }

    fn insert(&mut self, record: ProxyRecord) -> bool {
        if self.position(&record.url).is_some() {
            return false;
        }
        self.records.push(record);
        true
    }

    /// Fairness scheduler over records accepted by `filter`
    ///
    /// A record that was never selected wins immediately; otherwise the
    /// least recently selected one wins, ties going to collection order.
    fn pick<F>(&mut self, exclude_url: Option<&str>, filter: F) -> Option<ProxyRecord>
    where
        F: Fn(&ProxyRecord) -> bool,
    {
        let mut selected: Option<usize> = None;
        let mut oldest: Option<Instant> = None;

        for (idx, record) in self.records.iter().enumerate() {
            if !record.is_working || Some(record.url.as_str()) == exclude_url || !filter(record) {
                continue;
            }

            match self.last_selected.get(&record.url) {
                None => {
                    selected = Some(idx);
                    break;
                }
                Some(&used_at) => {
                    if oldest.map_or(true, |o| used_at < o) {
                        oldest = Some(used_at);
                        selected = Some(idx);
                    }
                }
            }
        }

        let idx = selected?;
        let now = Instant::now();
        let record = &mut self.records[idx];
        record.last_used = Some(now);
        self.last_selected.insert(record.url.clone(), now);
        Some(record.clone())
    }
}

/// Pool of upstream proxies shared by every session and background task
pub struct ProxyPool {
    state: RwLock<PoolState>,
    source: Option<Arc<dyn ProxySource>>,
    stats: PoolStats,
}

impl fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyPool")
            .field("has_source", &self.source.is_some())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl ProxyPool {
    /// Create an empty pool with the given tunables
    pub fn new(settings: PoolConfig) -> Self {
        ProxyPool {
            state: RwLock::new(PoolState {
                records: Vec::new(),
                last_selected: HashMap::new(),
                cache: HashMap::new(),
                settings,
            }),
            source: None,
            stats: PoolStats::new(),
        }
    }

    /// Attach the fetch collaborator consulted by [`select_for_type`](Self::select_for_type)
    pub fn with_source(mut self, source: Arc<dyn ProxySource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Pool statistics
    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Insert a record unless one with the same URL already exists
    ///
    /// Returns `true` when the record was inserted.
    pub async fn add(&self, record: ProxyRecord) -> bool {
        let url = record.url.clone();
        let proxy_type = record.proxy_type;
        let inserted = self.state.write().await.insert(record);
        if inserted {
            self.stats.record_added();
            info!("Added proxy: {} (type: {})", url, proxy_type);
        }
        inserted
    }

    /// Insert many records, returning how many were new
    pub async fn add_all(&self, records: Vec<ProxyRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.add(record).await {
                added += 1;
            }
        }
        added
    }

    /// Number of records in the pool
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Whether the pool holds no records
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }

    /// Point-in-time copy of every record, in collection order
    pub async fn snapshot(&self) -> Vec<ProxyRecord> {
        self.state.read().await.records.clone()
    }

    /// Look up a record by URL
    pub async fn get(&self, url: &str) -> Option<ProxyRecord> {
        let state = self.state.read().await;
        state.position(url).map(|idx| state.records[idx].clone())
    }

    /// Next working record other than `exclude_url`, fairest first
    pub async fn next_working(&self, exclude_url: Option<&str>) -> Option<ProxyRecord> {
        let selected = self.state.write().await.pick(exclude_url, |_| true);
        if selected.is_some() {
            self.stats.record_selected();
        }
        selected
    }

    /// Obtain a record of `proxy_type` for a new session
    ///
    /// With a source attached, a fresh batch is fetched and the first
    /// record of the requested type is returned; if the fetch fails, a
    /// cached record younger than [`CACHE_MAX_AGE`] is used instead.
    /// Without a source the pool's own collection is scheduled fairly.
    /// Never waits for a record to become available.
    pub async fn select_for_type(&self, proxy_type: ProxyType) -> GatewayResult<ProxyRecord> {
        let selected = match &self.source {
            Some(source) => self.select_from_source(source.as_ref(), proxy_type).await,
            None => self
                .state
                .write()
                .await
                .pick(None, |r| r.proxy_type == proxy_type)
                .ok_or_else(|| {
                    GatewayError::Unavailable(format!("no working {} proxy in pool", proxy_type))
                }),
        }?;

        self.stats.record_selected();
        debug!("Selected upstream {}", selected);
        Ok(selected)
    }

    async fn select_from_source(
        &self,
        source: &dyn ProxySource,
        proxy_type: ProxyType,
    ) -> GatewayResult<ProxyRecord> {
        let fetched = match source.fetch_upstream_proxies().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Proxy fetch failed, trying cache: {}", e);
                return self.cached(proxy_type).await.ok_or_else(|| {
                    GatewayError::Unavailable(format!("failed to get {} proxy: {}", proxy_type, e))
                });
            }
        };

        let now = Instant::now();
        let mut state = self.state.write().await;
        let mut selected = None;
        let mut added = 0;

        for record in fetched {
            state.cache.insert(
                record.proxy_type,
                CachedRecord {
                    record: record.clone(),
                    fetched_at: now,
                },
            );
            if selected.is_none() && record.proxy_type == proxy_type {
                selected = Some(record.clone());
            }
            if state.insert(record) {
                added += 1;
            }
        }

        if let Some(record) = &selected {
            state.last_selected.insert(record.url.clone(), now);
        }
        drop(state);

        for _ in 0..added {
            self.stats.record_added();
        }

        selected.ok_or_else(|| {
            GatewayError::Unavailable(format!("no suitable proxy found for type {}", proxy_type))
        })
    }

    /// Cached record of `proxy_type`, if still fresh
    async fn cached(&self, proxy_type: ProxyType) -> Option<ProxyRecord> {
        let state = self.state.read().await;
        state
            .cache
            .get(&proxy_type)
            .filter(|c| c.fetched_at.elapsed() < CACHE_MAX_AGE)
            .map(|c| c.record.clone())
    }

    /// Reset a record's failure accounting after a success
    pub async fn mark_success(&self, record: &ProxyRecord) -> bool {
        let mut state = self.state.write().await;
        let Some(idx) = state.position(&record.url) else {
            return false;
        };
        let entry = &mut state.records[idx];
        entry.fail_count = 0;
        entry.is_working = true;
        self.stats.record_success();
        true
    }

    /// Count a failure against a record and take it out of rotation
    pub async fn mark_failure(&self, record: &ProxyRecord) -> bool {
        let mut state = self.state.write().await;
        let Some(idx) = state.position(&record.url) else {
            return false;
        };
        let entry = &mut state.records[idx];
        entry.fail_count += 1;
        entry.is_working = false;
        info!(
            "Marked proxy as failed: {} (fail count: {})",
            entry.url, entry.fail_count
        );
        self.stats.record_failure();
        true
    }

    /// Apply one health-probe outcome; records removed meanwhile are ignored
    pub(crate) async fn record_check(&self, url: &str, healthy: bool) {
        let mut state = self.state.write().await;
        let Some(idx) = state.position(url) else {
            debug!("Probed proxy {} left the pool during the sweep", url);
            return;
        };
        let entry = &mut state.records[idx];
        entry.last_checked = Some(Instant::now());
        entry.is_working = healthy;
        if healthy {
            entry.fail_count = 0;
            self.stats.record_success();
        } else {
            entry.fail_count += 1;
            self.stats.record_failure();
        }
    }

    /// Remove every record whose fail count reached the threshold
    ///
    /// Returns the URLs that were evicted.
    pub async fn evict_failed(&self) -> Vec<String> {
        let mut state = self.state.write().await;
        let threshold = state.settings.fail_threshold;
        let mut evicted = Vec::new();

        state.records.retain(|record| {
            if record.fail_count < threshold {
                true
            } else {
                info!(
                    "Removing failed proxy: {} (failed {} times)",
                    record.url, record.fail_count
                );
                evicted.push(record.url.clone());
                false
            }
        });

        for url in &evicted {
            state.last_selected.remove(url);
        }
        drop(state);

        self.stats.record_evicted(evicted.len());
        evicted
    }

    /// Change the endpoint probed during health checks
    pub async fn set_test_url(&self, url: impl Into<String>) {
        self.state.write().await.settings.test_url = url.into();
    }

    /// Change the fetch retry budget
    pub async fn set_max_retries(&self, retries: u32) {
        self.state.write().await.settings.max_retries = retries;
    }

    /// Change the eviction threshold
    pub async fn set_fail_threshold(&self, threshold: u32) {
        self.state.write().await.settings.fail_threshold = threshold;
    }

    /// Change the health check interval
    pub async fn set_check_interval(&self, interval: Duration) {
        self.state.write().await.settings.health_check_interval = interval.as_secs().max(1);
    }

    /// Current tunables
    pub async fn settings(&self) -> PoolConfig {
        self.state.read().await.settings.clone()
    }

    /// Current fetch retry budget
    pub async fn max_retries(&self) -> u32 {
        self.state.read().await.settings.max_retries
    }

    /// Current health check interval
    pub async fn check_interval(&self) -> Duration {
        self.state.read().await.settings.check_interval()
    }

    #[cfg(test)]
    async fn age_cache(&self, proxy_type: ProxyType, age: Duration) {
        let mut state = self.state.write().await;
        if let Some(cached) = state.cache.get_mut(&proxy_type) {
            if let Some(fetched_at) = Instant::now().checked_sub(age) {
                cached.fetched_at = fetched_at;
            }
        }
    }
}
