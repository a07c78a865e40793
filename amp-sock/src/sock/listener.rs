//! Listening sockets and the accept loop.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;

use super::connection::connection_loop;
use super::peers::Origin;
use super::{wait_for_shutdown, Shared};
use crate::error::SockError;

/// Bind a listener on `port` and start its accept loop.
///
/// Resolves once the socket is bound and listening, returning the actual
/// bound port so callers binding port 0 can discover it. Setup failures are
/// reported through the error callback before being returned.
pub(crate) async fn bind(shared: &Arc<Shared>, port: u16) -> Result<u16, SockError> {
    let listener = match setup(port) {
        Ok(listener) => listener,
        Err(error) => {
            shared.handler.on_error(&error);
            return Err(error);
        }
    };

    let bound_port = match listener.local_addr() {
        Ok(addr) => addr.port(),
        Err(source) => {
            let error = SockError::SocketSetup {
                stage: "bind",
                source,
            };
            shared.handler.on_error(&error);
            return Err(error);
        }
    };

    tracing::debug!(port = bound_port, "listener up");
    shared.handler.on_bound(bound_port);

    let task_shared = shared.clone();
    let shutdown = shared.shutdown_rx();
    shared.spawn_worker(accept_loop(task_shared, listener, shutdown));

    Ok(bound_port)
}

/// Socket setup, one fallible stage at a time so failures name the step.
///
/// The reuse-address option is applied before bind.
fn setup(port: u16) -> Result<TcpListener, SockError> {
    let socket = TcpSocket::new_v4().map_err(|source| SockError::SocketSetup {
        stage: "create",
        source,
    })?;
    socket
        .set_reuseaddr(true)
        .map_err(|source| SockError::SocketSetup {
            stage: "configure",
            source,
        })?;
    socket
        .bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .map_err(|source| SockError::SocketSetup {
            stage: "bind",
            source,
        })?;
    socket.listen(1024).map_err(|source| SockError::SocketSetup {
        stage: "listen",
        source,
    })
}

/// Accept peers until teardown.
///
/// Every accepted connection gets its own task; an accepted peer that drops
/// its link is simply forgotten.
async fn accept_loop(shared: Arc<Shared>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = wait_for_shutdown(&mut shutdown) => return,

            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    let (peer, outgoing) = shared.register_peer(Origin::Accepted);
                    tracing::debug!(peer = peer.0, %remote, "accepted peer");
                    let task_shared = shared.clone();
                    let task_shutdown = shutdown.clone();
                    shared.spawn_worker(async move {
                        let _ = connection_loop(&task_shared, peer, stream, outgoing, task_shutdown)
                            .await;
                    });
                }
                Err(error) => {
                    tracing::debug!(%error, "accept failed");
                }
            },
        }
    }
}
