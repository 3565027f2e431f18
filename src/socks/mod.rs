//! SOCKS5 module for Proxygate
//!
//! Server side of the gateway (greeting, request parsing, replies), the
//! client used to chain through an upstream SOCKS5 proxy, and the relay
//! joining the two connections.

mod auth;
mod client;
mod command;
mod consts;
mod handler;
mod relay;
mod types;

pub use auth::{
    authenticate_password, negotiate, AuthMethod, CredentialValidator, StaticCredentials,
};
pub use client::{handshake, ChainClient};
pub use command::{build_reply, encode_reply, parse_command};
pub use consts::*;
pub use handler::GatewayHandler;
pub use relay::{relay_tcp, RelayStats};
pub use types::{SocksCommand, TargetAddr};
