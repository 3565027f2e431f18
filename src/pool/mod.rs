//! Upstream proxy pool for Proxygate
//!
//! Holds the managed set of third-party upstream proxies: selection with
//! fairness, success and failure accounting, periodic health checking and
//! eviction.

mod health;
mod manager;
mod record;
mod stats;

pub use health::{check_all, HealthCheckTask, HealthProbe, HttpProbe, SweepReport};
pub use manager::{ProxyPool, CACHE_MAX_AGE};
pub use record::{ProxyRecord, ProxyType};
pub use stats::{PoolStats, PoolStatsSnapshot};
