//! Per-connection I/O task.
//!
//! Each live connection is driven by exactly one loop that owns the stream
//! and multiplexes teardown, outgoing frames and inbound bytes. Keeping both
//! directions in one task serializes the receive path per connection while
//! connections progress independently of each other.

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use super::{wait_for_shutdown, PeerId, Shared, Sock};

const READ_CHUNK_SIZE: usize = 4096;

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkExit {
    /// Endpoint teardown.
    Shutdown,
    /// Remote close, read failure or write failure.
    Dropped,
}

/// Drive one live connection until teardown or link drop.
///
/// On link drop the peer is evicted from the table before returning, so a
/// queued frame can no longer pick it.
pub(crate) async fn connection_loop(
    shared: &Arc<Shared>,
    peer: PeerId,
    mut stream: TcpStream,
    mut outgoing: mpsc::UnboundedReceiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) -> LinkExit {
    let sock = Sock::from_shared(shared.clone());
    let mut read_buf: Vec<u8> = Vec::with_capacity(READ_CHUNK_SIZE);
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];

    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => {
                return LinkExit::Shutdown;
            }

            frame = outgoing.recv() => match frame {
                Some(data) => {
                    if let Err(error) = stream.write_all(&data).await {
                        tracing::debug!(peer = peer.0, %error, "write failed, evicting peer");
                        shared.evict(peer);
                        return LinkExit::Dropped;
                    }
                }
                // The sending half is gone: the peer was evicted elsewhere.
                None => return LinkExit::Dropped,
            },

            read = stream.read(&mut chunk) => match read {
                Ok(0) => {
                    tracing::debug!(peer = peer.0, "remote closed");
                    shared.evict(peer);
                    return LinkExit::Dropped;
                }
                Ok(n) => {
                    read_buf.extend_from_slice(&chunk[..n]);
                    shared.handler.on_data(&sock, peer, &mut read_buf);
                }
                Err(error) => {
                    tracing::debug!(peer = peer.0, %error, "read failed, evicting peer");
                    shared.evict(peer);
                    return LinkExit::Dropped;
                }
            },
        }
    }
}
