//! Username/password authentication handler
//!
//! Server side of RFC 1929 plus the pluggable credential check.

use crate::config::SocksConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::socks::consts::*;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Decides whether a client's credentials are acceptable
pub trait CredentialValidator: Send + Sync {
    /// `true` to let the client in
    fn validate(&self, username: &str, password: &str) -> bool;
}

/// Fixed username and password
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    username: String,
    password: String,
}

impl StaticCredentials {
    /// Accept exactly `username` / `password`
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        StaticCredentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Build from the `[server.socks]` section
    ///
    /// Returns `None` when client authentication is not required.
    pub fn from_config(config: &SocksConfig) -> Option<Self> {
        if !config.auth_required {
            return None;
        }
        match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(Self::new(username, password)),
            _ => None,
        }
    }
}

impl CredentialValidator for StaticCredentials {
    fn validate(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }
}

/// Read one length-prefixed field
async fn read_field<S>(stream: &mut S, what: &str) -> GatewayResult<String>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u8().await? as usize;
    let mut field = vec![0u8; len];
    stream.read_exact(&mut field).await?;
    String::from_utf8(field).map_err(|_| GatewayError::Format(format!("invalid UTF-8 in {}", what)))
}

async fn send_auth_result<S>(stream: &mut S, status: u8) -> GatewayResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}

/// Perform username/password authentication
///
/// Client sends:
/// ```text
/// +----+------+----------+------+----------+
/// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
/// +----+------+----------+------+----------+
/// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
/// +----+------+----------+------+----------+
/// ```
///
/// Server responds with `01 00` on success and `01 01` otherwise.
pub async fn authenticate_password<S>(
    stream: &mut S,
    validator: &dyn CredentialValidator,
) -> GatewayResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let version = stream.read_u8().await?;
    if version != SOCKS5_AUTH_VERSION {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        return Err(GatewayError::Format(format!(
            "invalid auth version: {}",
            version
        )));
    }

    let username = read_field(stream, "username").await?;
    let password = read_field(stream, "password").await?;

    if validator.validate(&username, &password) {
        send_auth_result(stream, SOCKS5_AUTH_SUCCESS).await?;
        debug!("Authentication successful for user: {}", username);
        Ok(())
    } else {
        send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
        Err(GatewayError::Auth(format!(
            "authentication failed for user: {}",
            username
        )))
    }
}
