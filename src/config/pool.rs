//! Proxy pool configuration
//!
//! Tunables consumed by the upstream proxy pool and its health checker.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of fetch retries for the refresh task
fn default_max_retries() -> u32 {
    3
}

/// Default failure count at which a record is evicted
fn default_fail_threshold() -> u32 {
    5
}

/// Default health check interval in seconds
fn default_health_check_interval() -> u64 {
    300
}

/// Default endpoint probed through each upstream
fn default_test_url() -> String {
    "http://ip4.me/api".to_string()
}

/// Default probe timeout in seconds
fn default_check_timeout() -> u64 {
    10
}

/// Upstream proxy pool configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    /// Maximum fetch retries before the refresh task gives up for a round
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Records whose fail count reaches this value are evicted
    #[serde(default = "default_fail_threshold")]
    pub fail_threshold: u32,

    /// Health check interval in seconds
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval: u64,

    /// URL requested through every upstream during a health check
    #[serde(default = "default_test_url")]
    pub test_url: String,

    /// Per-probe timeout in seconds
    #[serde(default = "default_check_timeout")]
    pub check_timeout: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_retries: default_max_retries(),
            fail_threshold: default_fail_threshold(),
            health_check_interval: default_health_check_interval(),
            test_url: default_test_url(),
            check_timeout: default_check_timeout(),
        }
    }
}

impl PoolConfig {
    /// Health check interval as a duration
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    /// Probe timeout as a duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout)
    }

    /// Validate the pool configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.fail_threshold == 0 {
            return Err("fail_threshold must be greater than 0".to_string());
        }
        if self.health_check_interval == 0 {
            return Err("health_check_interval must be greater than 0".to_string());
        }
        if self.check_timeout == 0 {
            return Err("check_timeout must be greater than 0".to_string());
        }
        url::Url::parse(&self.test_url)
            .map_err(|e| format!("invalid test_url {}: {}", self.test_url, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.fail_threshold, 5);
        assert_eq!(config.health_check_interval, 300);
        assert_eq!(config.test_url, "http://ip4.me/api");
        assert_eq!(config.check_timeout, 10);
        assert_eq!(config.check_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_pool_config_validate_valid() {
        assert!(PoolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_pool_config_validate_zero_threshold() {
        let config = PoolConfig {
            fail_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("fail_threshold"));
    }

    #[test]
    fn test_pool_config_validate_bad_test_url() {
        let config = PoolConfig {
            test_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("test_url"));
    }
}
