//! Tunnel relay
//!
//! Copies bytes between the client and the upstream in two independent
//! tasks. The first direction to finish wins: the other one is told to
//! stop, and each task shuts down the write half it owns before exiting.

use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::debug;

const RELAY_BUFFER_SIZE: usize = 8192;

/// Bytes moved in each direction
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to upstream
    pub client_to_upstream: u64,
    /// Upstream to client
    pub upstream_to_client: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client->upstream"),
            Direction::UpstreamToClient => write!(f, "upstream->client"),
        }
    }
}

async fn forward<R, W>(reader: &mut R, writer: &mut W, copied: &mut u64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        writer.write_all(&buf[..n]).await?;
        *copied += n as u64;
    }
}

/// One direction of the tunnel, run until EOF, error or stop signal
async fn pump<R, W>(
    direction: Direction,
    mut reader: R,
    mut writer: W,
    done: mpsc::Sender<Direction>,
    mut stop: watch::Receiver<bool>,
) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut copied = 0u64;

    tokio::select! {
        result = forward(&mut reader, &mut writer, &mut copied) => {
            if let Err(e) = result {
                debug!("Relay {} error: {}", direction, e);
            }
            let _ = done.send(direction).await;
        }
        _ = stop.changed() => {
            debug!("Relay {} cancelled", direction);
        }
    }

    let _ = writer.shutdown().await;
    copied
}

/// Relay between `client` and `upstream` until one direction ends
///
/// Both streams are closed when this returns.
pub async fn relay_tcp<C, U>(client: C, upstream: U) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);

    let (done_tx, mut done_rx) = mpsc::channel(2);
    let (stop_tx, stop_rx) = watch::channel(false);

    let outbound = tokio::spawn(pump(
        Direction::ClientToUpstream,
        client_read,
        upstream_write,
        done_tx.clone(),
        stop_rx.clone(),
    ));
    let inbound = tokio::spawn(pump(
        Direction::UpstreamToClient,
        upstream_read,
        client_write,
        done_tx,
        stop_rx,
    ));

    if let Some(first) = done_rx.recv().await {
        debug!("Relay {} finished first", first);
    }
    let _ = stop_tx.send(true);

    RelayStats {
        client_to_upstream: outbound.await.unwrap_or_default(),
        upstream_to_client: inbound.await.unwrap_or_default(),
    }
}
