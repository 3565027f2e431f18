//! SOCKS5 client authentication
//!
//! Method negotiation for inbound connections. Without a validator every
//! client is accepted with method 0x00; with one, clients must pick
//! username/password and pass RFC 1929 sub-negotiation.

mod password;

pub use password::{authenticate_password, CredentialValidator, StaticCredentials};

use super::consts::*;
use crate::error::{GatewayError, GatewayResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// No authentication required
    None,
    /// Username/password authentication
    Password,
}

impl AuthMethod {
    /// Convert to SOCKS5 method byte
    pub fn to_byte(self) -> u8 {
        match self {
            AuthMethod::None => SOCKS5_AUTH_METHOD_NONE,
            AuthMethod::Password => SOCKS5_AUTH_METHOD_PASSWORD,
        }
    }
}

/// Run the greeting and, when required, the credential check
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
pub async fn negotiate<S>(
    stream: &mut S,
    validator: Option<&dyn CredentialValidator>,
) -> GatewayResult<AuthMethod>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await?;

    let [version, num_methods] = buf;
    if version != SOCKS5_VERSION {
        return Err(GatewayError::Format(format!(
            "unsupported SOCKS version: {}",
            version
        )));
    }

    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    let Some(validator) = validator else {
        send_method(stream, SOCKS5_AUTH_METHOD_NONE).await?;
        return Ok(AuthMethod::None);
    };

    if !methods.contains(&SOCKS5_AUTH_METHOD_PASSWORD) {
        send_method(stream, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE).await?;
        return Err(GatewayError::Auth(
            "client offered no acceptable authentication method".to_string(),
        ));
    }

    send_method(stream, SOCKS5_AUTH_METHOD_PASSWORD).await?;
    authenticate_password(stream, validator).await?;

    Ok(AuthMethod::Password)
}

async fn send_method<S>(stream: &mut S, method: u8) -> GatewayResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&[SOCKS5_VERSION, method]).await?;
    stream.flush().await?;
    Ok(())
}
