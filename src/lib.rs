//! # Proxygate - SOCKS5 Gateway over a Managed Upstream Pool
//!
//! Proxygate accepts SOCKS5 clients, picks a third-party upstream SOCKS5
//! proxy from a managed pool, chains the client's CONNECT request through
//! it and relays bytes until either side closes.
//!
//! ## Features
//!
//! - **Upstream Pool**: fair least-recently-used selection, success and
//!   failure accounting, periodic health checks and eviction
//! - **Proxy Chaining**: client-side SOCKS5 handshake with optional
//!   RFC 1929 credentials towards the upstream
//! - **Sources**: a remote JSON API and plain-text list files with reload
//! - **Client Authentication**: optional username/password check
//!
//! ## Usage
//!
//! ```rust,ignore
//! use proxygate::config::load_config;
//! use proxygate::run_gateway;
//! use tokio::sync::broadcast;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config("config.toml")?;
//!     let (shutdown_tx, _) = broadcast::channel(1);
//!
//!     run_gateway(config, shutdown_tx).await
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 Client -> Proxygate -> Upstream SOCKS5 Proxy -> Target
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod gateway;
pub mod helper;
pub mod pool;
pub mod server;
pub mod socks;
pub mod source;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{GatewayError, GatewayResult, Socks5ReplyCode};
pub use gateway::run_gateway;
pub use pool::{ProxyPool, ProxyRecord, ProxyType};

/// Version of the Proxygate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
