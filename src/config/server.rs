//! Gateway server configuration types
//!
//! Defines the root configuration and the listener-side settings.

use super::{PoolConfig, SourceConfig, TcpConfig};
use serde::{Deserialize, Serialize};

/// Default listen address
fn default_listen_addr() -> String {
    "0.0.0.0:8081".to_string()
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Upstream pool configuration
    #[serde(default)]
    pub pool: PoolConfig,

    /// Upstream list sources
    #[serde(default)]
    pub source: SourceConfig,
}

impl Config {
    /// Validate every section
    pub fn validate(&self) -> Result<(), String> {
        self.server.socks.validate()?;
        self.pool.validate()?;
        self.source.validate()?;
        Ok(())
    }
}

/// Listener configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address the SOCKS5 listener binds to (e.g., "0.0.0.0:8081")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Socket options for accepted and dialed connections
    #[serde(default)]
    pub tcp: TcpConfig,

    /// SOCKS5 server configuration
    #[serde(default)]
    pub socks: SocksConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: default_listen_addr(),
            tcp: TcpConfig::default(),
            socks: SocksConfig::default(),
        }
    }
}

/// SOCKS5 server configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SocksConfig {
    /// Require username/password authentication from clients
    #[serde(default)]
    pub auth_required: bool,

    /// Username accepted from clients
    #[serde(default)]
    pub username: Option<String>,

    /// Password accepted from clients
    #[serde(default)]
    pub password: Option<String>,
}

impl SocksConfig {
    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.auth_required && !self.has_credentials() {
            return Err("Authentication required but no credentials configured".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8081");
        assert!(!config.socks.auth_required);
        assert!(config.tcp.nodelay);
    }

    #[test]
    fn test_socks_config_has_credentials() {
        let config = SocksConfig {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..Default::default()
        };
        assert!(config.has_credentials());

        let config = SocksConfig {
            username: Some("user".to_string()),
            password: None,
            ..Default::default()
        };
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_socks_config_validate() {
        let config = SocksConfig {
            auth_required: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SocksConfig {
            auth_required: true,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }
}
