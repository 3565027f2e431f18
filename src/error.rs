//! Error types for Proxygate
//!
//! This module defines the error taxonomy shared by the pool, the
//! chaining client and the SOCKS5 server handler.

use std::io;
use thiserror::Error;

/// Main error type for Proxygate operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed proxy-list line or malformed wire data
    #[error("Format error: {0}")]
    Format(String),

    /// Dial, read or write failure
    #[error("Network error: {0}")]
    Network(#[from] io::Error),

    /// Upstream rejected the offered credentials or methods
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Upstream could not be reached or refused the CONNECT request
    #[error("Connection error: {reason}")]
    Connect {
        /// Human readable cause
        reason: String,
        /// SOCKS5 status code reported by the upstream, if any
        code: Option<u8>,
    },

    /// No working record of the requested type
    #[error("No upstream proxy available: {0}")]
    Unavailable(String),

    /// Proxy source (remote API) failure
    #[error("Proxy source error: {0}")]
    Source(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Client requested a SOCKS5 command other than CONNECT
    #[error("Command not supported: {0:#04x}")]
    CommandNotSupported(u8),

    /// Client used an unknown SOCKS5 address type
    #[error("Address type not supported: {0:#04x}")]
    AddressTypeNotSupported(u8),
}

impl GatewayError {
    /// Build a connect error without an upstream status code
    pub fn connect(reason: impl Into<String>) -> Self {
        GatewayError::Connect {
            reason: reason.into(),
            code: None,
        }
    }

    /// Whether this failure should be charged to the upstream record
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            GatewayError::Network(_)
                | GatewayError::Auth(_)
                | GatewayError::Connect { .. }
                | GatewayError::Timeout(_)
        )
    }

    /// SOCKS5 reply code sent to the client for this failure
    pub fn reply_code(&self) -> Socks5ReplyCode {
        match self {
            GatewayError::Connect {
                code: Some(code), ..
            } => Socks5ReplyCode::try_from(*code).unwrap_or(Socks5ReplyCode::GeneralFailure),
            GatewayError::CommandNotSupported(_) => Socks5ReplyCode::CommandNotSupported,
            GatewayError::AddressTypeNotSupported(_) => Socks5ReplyCode::AddressTypeNotSupported,
            _ => Socks5ReplyCode::GeneralFailure,
        }
    }
}

/// Result alias used throughout the library
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Socks5ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    GeneralFailure = 0x01,
    /// Connection not allowed by ruleset
    ConnectionNotAllowed = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddressTypeNotSupported = 0x08,
}

impl From<Socks5ReplyCode> for u8 {
    fn from(code: Socks5ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for Socks5ReplyCode {
    type Error = GatewayError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Socks5ReplyCode::Succeeded),
            0x01 => Ok(Socks5ReplyCode::GeneralFailure),
            0x02 => Ok(Socks5ReplyCode::ConnectionNotAllowed),
            0x03 => Ok(Socks5ReplyCode::NetworkUnreachable),
            0x04 => Ok(Socks5ReplyCode::HostUnreachable),
            0x05 => Ok(Socks5ReplyCode::ConnectionRefused),
            0x06 => Ok(Socks5ReplyCode::TtlExpired),
            0x07 => Ok(Socks5ReplyCode::CommandNotSupported),
            0x08 => Ok(Socks5ReplyCode::AddressTypeNotSupported),
            _ => Err(GatewayError::Format(format!(
                "Unknown SOCKS5 reply code: {}",
                value
            ))),
        }
    }
}
