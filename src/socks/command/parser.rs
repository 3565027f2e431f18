//! SOCKS5 command parser
//!
//! Parses the client's request after the greeting.

use crate::error::{GatewayError, GatewayResult};
use crate::socks::consts::*;
use crate::socks::types::{SocksCommand, TargetAddr};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

/// Parse a CONNECT request from the stream
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Any command other than CONNECT fails with
/// [`GatewayError::CommandNotSupported`] before the address is read.
pub async fn parse_command<S>(stream: &mut S) -> GatewayResult<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    let [version, cmd, _reserved, addr_type] = header;

    if version != SOCKS5_VERSION {
        return Err(GatewayError::Format(format!(
            "unsupported SOCKS version in request: {}",
            version
        )));
    }

    match SocksCommand::from_byte(cmd) {
        Some(SocksCommand::Connect) => {}
        Some(other) => {
            debug!("Rejecting SOCKS5 {} request", other);
            return Err(GatewayError::CommandNotSupported(cmd));
        }
        None => return Err(GatewayError::CommandNotSupported(cmd)),
    }

    let target = TargetAddr::read_from(stream, addr_type).await?;
    debug!("Parsed SOCKS5 CONNECT to {}", target);

    Ok(target)
}
