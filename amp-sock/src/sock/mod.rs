//! Connection management and frame scheduling.
//!
//! [`Sock`] is the engine's connection manager. It owns the listeners, the
//! outbound connectors and the single global table of live peers, and it
//! writes already-encoded frames to one or more of those peers according to
//! a [`Destination`] policy. Everything role-specific lives above it, behind
//! the [`SockHandler`] seam.

mod connection;
mod connector;
mod listener;
mod peers;

use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::config::{Backoff, SockConfig};
use crate::error::SockError;
use crate::lock;
pub use peers::PeerId;
pub(crate) use peers::{Origin, PeerHandle, PeerTable};

/// Where an outgoing frame should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Destination {
    /// Every live peer.
    Broadcast,
    /// The next live peer after the round-robin cursor; waits for one to
    /// appear within the bounded backoff window.
    RoundRobin,
    /// One specific peer. The frame is dropped if it is gone.
    Peer(PeerId),
}

/// Seam between the connection manager and the role-specific engine.
///
/// Implementations run on connection tasks. `on_data` for a given peer is
/// always invoked sequentially in receive order; calls for different peers
/// may run in parallel and may block.
pub(crate) trait SockHandler: Send + Sync + 'static {
    /// A listener came up on `port`.
    fn on_bound(&self, port: u16);

    /// Bytes arrived from `peer`. The implementation drains the complete
    /// frames from `buf` and leaves any trailing partial frame in place.
    fn on_data(&self, sock: &Sock, peer: PeerId, buf: &mut Vec<u8>);

    /// A socket setup failure that ends the listener.
    fn on_error(&self, error: &SockError);
}

/// The connection manager.
pub(crate) struct Sock {
    shared: Arc<Shared>,
}

/// State shared between the manager handle and its worker tasks.
pub(crate) struct Shared {
    pub(crate) config: SockConfig,
    pub(crate) handler: Arc<dyn SockHandler>,
    peers: Mutex<PeerTable>,
    connectors: Mutex<Vec<(String, u16)>>,
    workers: Mutex<JoinSet<()>>,
    next_peer_id: AtomicU64,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl Sock {
    pub(crate) fn new(config: SockConfig, handler: Arc<dyn SockHandler>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                config,
                handler,
                peers: Mutex::new(PeerTable::default()),
                connectors: Mutex::new(Vec::new()),
                workers: Mutex::new(JoinSet::new()),
                next_peer_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Start a listener on `port`; resolves once it is bound and listening.
    pub(crate) async fn bind(&self, port: u16) -> Result<u16, SockError> {
        if self.shared.is_closed() {
            return Err(SockError::Closed);
        }
        listener::bind(&self.shared, port).await
    }

    /// Start an outbound connector; the first attempt runs asynchronously
    /// and reconnection continues until teardown.
    pub(crate) fn connect(&self, hostname: &str, port: u16) -> Result<(), SockError> {
        if self.shared.is_closed() {
            return Err(SockError::Closed);
        }
        lock(&self.shared.connectors).push((hostname.to_owned(), port));
        let shared = self.shared.clone();
        let shutdown = self.shared.shutdown_rx();
        self.shared
            .spawn_worker(connector::connector_loop(shared, hostname.to_owned(), port, shutdown));
        Ok(())
    }

    /// True when a connector exists for exactly this `(hostname, port)`
    /// pair, regardless of its current link state.
    pub(crate) fn is_connected(&self, hostname: &str, port: u16) -> bool {
        lock(&self.shared.connectors)
            .iter()
            .any(|(h, p)| h == hostname && *p == port)
    }

    /// Schedule an encoded frame for delivery.
    pub(crate) fn send(&self, frame: Vec<u8>, destination: Destination) -> Result<(), SockError> {
        if self.shared.is_closed() {
            return Err(SockError::Closed);
        }
        match destination {
            Destination::Broadcast => {
                self.shared.broadcast(frame);
                Ok(())
            }
            Destination::Peer(peer) => {
                self.shared.send_to(peer, frame);
                Ok(())
            }
            Destination::RoundRobin => {
                // Fast path: a live peer takes the frame right away, so
                // sequential sends rotate deterministically.
                let target = lock(&self.shared.peers).next_round_robin();
                match target {
                    Some((peer, handle)) => {
                        if handle.sender.send(frame).is_err() {
                            self.shared.evict(peer);
                        }
                    }
                    None => {
                        // No live peer: the frame waits in a worker.
                        let shared = self.shared.clone();
                        let shutdown = self.shared.shutdown_rx();
                        self.shared
                            .spawn_worker(round_robin_send(shared, frame, shutdown));
                    }
                }
                Ok(())
            }
        }
    }

    /// Tear everything down: close every socket and wait for every worker.
    ///
    /// Idempotent. When this returns, no worker is running anymore.
    pub(crate) async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.shutdown.send(true);
        // Dropping the peer handles closes every writer channel.
        lock(&self.shared.peers).clear();

        let mut workers = std::mem::take(&mut *lock(&self.shared.workers));
        while workers.join_next().await.is_some() {}
    }
}

/// Wait until `shutdown` is signalled, without holding the `watch::Ref`
/// guard across an `.await` (that guard is not `Send`, which would make
/// any `select!` branch built on it poison the enclosing future).
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

impl Shared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }


    /// Track a worker task so teardown can wait for it.
    pub(crate) fn spawn_worker(&self, task: impl Future<Output = ()> + Send + 'static) {
        let mut workers = lock(&self.workers);
        // Reap finished workers so the set does not grow without bound.
        while workers.try_join_next().is_some() {}
        if self.is_closed() {
            return;
        }
        workers.spawn(task);
    }

    /// Add a new peer to the global table, yielding its writer channel.
    pub(crate) fn register_peer(
        &self,
        origin: Origin,
    ) -> (PeerId, mpsc::UnboundedReceiver<Vec<u8>>) {
        let id = PeerId(self.next_peer_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.peers).insert(id, PeerHandle { sender: tx, origin });
        (id, rx)
    }

    /// Remove a peer from the global table.
    pub(crate) fn evict(&self, peer: PeerId) {
        if lock(&self.peers).remove(peer).is_some() {
            tracing::debug!(peer = peer.0, "peer evicted");
        }
    }

    /// Send to every live peer. Complete but unordered across peers.
    fn broadcast(&self, frame: Vec<u8>) {
        let targets = lock(&self.peers).all();
        for (peer, handle) in targets {
            if handle.sender.send(frame.clone()).is_err() {
                self.evict(peer);
            }
        }
    }

    /// Send to one specific peer; a departed peer drops the frame.
    fn send_to(&self, peer: PeerId, frame: Vec<u8>) {
        match lock(&self.peers).get(peer) {
            Some(handle) => {
                if handle.sender.send(frame).is_err() {
                    self.evict(peer);
                }
            }
            None => tracing::debug!(peer = peer.0, "peer gone, dropping frame"),
        }
    }
}

/// Deliver one frame to the next round-robin peer.
///
/// With no live peer the frame waits here, retrying with the connector
/// backoff; after the configured number of full cap-length waits it is
/// dropped.
async fn round_robin_send(shared: Arc<Shared>, frame: Vec<u8>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = Backoff::new(&shared.config);

    loop {
        let target = lock(&shared.peers).next_round_robin();
        match target {
            Some((peer, handle)) => {
                if handle.sender.send(frame).is_err() {
                    // The peer vanished between pick and send; the frame is
                    // lost with it.
                    shared.evict(peer);
                }
                return;
            }
            None => {
                if backoff.capped_waits() >= shared.config.max_capped_waits {
                    tracing::warn!("no live peer within backoff window, dropping frame");
                    return;
                }
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = shutdown.wait_for(|closed| *closed) => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}
