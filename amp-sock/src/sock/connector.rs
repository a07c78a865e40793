//! Outbound connectors.
//!
//! A connector owns one persistent connection to a `(hostname, port)` pair
//! and maintains it forever: connect, serve the link until it drops, back
//! off, reconnect. There is no give-up; only endpoint teardown ends it.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::watch;

use super::connection::{connection_loop, LinkExit};
use super::peers::Origin;
use super::{wait_for_shutdown, Shared};
use crate::config::Backoff;

/// Connect-serve-reconnect loop for one destination.
pub(crate) async fn connector_loop(
    shared: Arc<Shared>,
    hostname: String,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(&shared.config);

    loop {
        let attempt = tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => return,

            attempt = TcpStream::connect((hostname.as_str(), port)) => attempt,
        };

        let stream = match attempt {
            Ok(stream) => stream,
            Err(error) => {
                let delay = backoff.next_delay();
                tracing::debug!(
                    host = %hostname, port, %error, ?delay,
                    "connect failed, backing off"
                );
                tokio::select! {
                    _ = wait_for_shutdown(&mut shutdown) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                continue;
            }
        };

        // Every successful connection resets the backoff.
        backoff.reset();
        let (peer, outgoing) = shared.register_peer(Origin::Outbound);
        tracing::debug!(peer = peer.0, host = %hostname, port, "connected");

        let exit = connection_loop(&shared, peer, stream, outgoing, shutdown.clone()).await;
        shared.evict(peer);

        if exit == LinkExit::Shutdown {
            return;
        }
        // Link dropped: loop back and reconnect.
    }
}
