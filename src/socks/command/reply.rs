//! SOCKS5 reply builder

use crate::error::{GatewayResult, Socks5ReplyCode};
use crate::socks::consts::*;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encode a reply
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// The bound address is always encoded as IPv4; IPv4-mapped IPv6
/// addresses are unwrapped and any other IPv6 address becomes `0.0.0.0`
/// with its port kept. Without an address `0.0.0.0:0` is used.
pub fn encode_reply(code: Socks5ReplyCode, bind_addr: Option<SocketAddr>) -> Vec<u8> {
    let (ip, port) = match bind_addr {
        Some(SocketAddr::V4(addr)) => (*addr.ip(), addr.port()),
        Some(SocketAddr::V6(addr)) => (
            addr.ip().to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
            addr.port(),
        ),
        None => (Ipv4Addr::UNSPECIFIED, 0),
    };

    let mut reply = vec![SOCKS5_VERSION, code.into(), SOCKS5_RESERVED, SOCKS5_ADDR_TYPE_IPV4];
    reply.extend_from_slice(&ip.octets());
    reply.extend_from_slice(&port.to_be_bytes());
    reply
}

/// Send a reply to the client
pub async fn build_reply<S>(
    stream: &mut S,
    code: Socks5ReplyCode,
    bind_addr: Option<SocketAddr>,
) -> GatewayResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&encode_reply(code, bind_addr)).await?;
    stream.flush().await?;
    Ok(())
}
