//! Upstream list source configuration
//!
//! Where new upstream proxies come from: a remote API and/or list files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default API refresh interval in seconds
fn default_refresh_interval() -> u64 {
    300
}

/// Default list-file polling interval in seconds
fn default_watch_interval() -> u64 {
    5
}

/// Proxy source configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceConfig {
    /// Remote API returning fresh upstream proxies
    #[serde(default)]
    pub api_url: Option<String>,

    /// API refresh interval in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,

    /// List file of HTTP upstreams
    #[serde(default)]
    pub http_file: Option<PathBuf>,

    /// List file of SOCKS5 upstreams
    #[serde(default)]
    pub socks5_file: Option<PathBuf>,

    /// List-file polling interval in seconds
    #[serde(default = "default_watch_interval")]
    pub watch_interval: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            api_url: None,
            refresh_interval: default_refresh_interval(),
            http_file: None,
            socks5_file: None,
            watch_interval: default_watch_interval(),
        }
    }
}

impl SourceConfig {
    /// Whether any list file is configured
    pub fn has_files(&self) -> bool {
        self.http_file.is_some() || self.socks5_file.is_some()
    }

    /// Refresh interval as a duration
    pub fn refresh_every(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    /// Watch interval as a duration
    pub fn watch_every(&self) -> Duration {
        Duration::from_secs(self.watch_interval)
    }

    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(api_url) = &self.api_url {
            url::Url::parse(api_url).map_err(|e| format!("invalid api_url {}: {}", api_url, e))?;
        }
        if self.refresh_interval == 0 {
            return Err("refresh_interval must be greater than 0".to_string());
        }
        if self.watch_interval == 0 {
            return Err("watch_interval must be greater than 0".to_string());
        }
        Ok(())
    }
}
