//! Pool statistics
//!
//! Lock-free counters describing how the upstream pool is being used.

use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Statistics for the upstream proxy pool
#[derive(Debug, Default)]
pub struct PoolStats {
    /// Records inserted into the pool
    pub total_added: AtomicUsize,
    /// Records handed out to sessions
    pub total_selected: AtomicUsize,
    /// Success callbacks (requests or probes)
    pub total_succeeded: AtomicUsize,
    /// Failure callbacks (requests or probes)
    pub total_failed: AtomicUsize,
    /// Records evicted after reaching the fail threshold
    pub total_evicted: AtomicUsize,
}

impl PoolStats {
    /// Create new pool stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an insertion
    pub fn record_added(&self) {
        self.total_added.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a selection
    pub fn record_selected(&self) {
        self.total_selected.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a success callback
    pub fn record_success(&self) {
        self.total_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failure callback
    pub fn record_failure(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record evictions
    pub fn record_evicted(&self, count: usize) {
        self.total_evicted.fetch_add(count, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            total_added: self.total_added.load(Ordering::Relaxed),
            total_selected: self.total_selected.load(Ordering::Relaxed),
            total_succeeded: self.total_succeeded.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
        }
    }

    /// Log pool health status
    pub fn log_health(&self, pool_size: usize) {
        let stats = self.snapshot();
        info!(
            "Pool health: size={}, added={}, selected={}, succeeded={}, failed={}, evicted={}",
            pool_size,
            stats.total_added,
            stats.total_selected,
            stats.total_succeeded,
            stats.total_failed,
            stats.total_evicted
        );
    }
}

/// Snapshot of pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub total_added: usize,
    pub total_selected: usize,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub total_evicted: usize,
}
