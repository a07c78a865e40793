//! The user-facing endpoint facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use amp_codec::{Field, Message};

use crate::config::SockConfig;
use crate::dispatch::Dispatcher;
use crate::error::SockError;
use crate::role::Role;
use crate::sock::{Destination, Sock};

/// A single messaging participant with one fixed [`Role`].
///
/// An endpoint owns zero or more listeners (one per [`bind`](Self::bind))
/// and zero or more outbound connectors (one per [`connect`](Self::connect)),
/// all feeding one shared set of live peers. Which operations are legal, and
/// how frames are routed, follows from the role; an illegal operation fails
/// with [`SockError::RoleMismatch`] and has no side effect.
///
/// `Endpoint` is a cheap clone; clones share the same underlying state, so a
/// callback that needs the endpoint can capture a clone of it.
///
/// # Example
///
/// ```no_run
/// use amp_sock::{Endpoint, Message, Role};
///
/// # async fn run() -> Result<(), amp_sock::SockError> {
/// let publisher = Endpoint::new(Role::Pub);
/// publisher.bind(3001).await?;
/// publisher.send(Message::new().with_string("news").with_bigint(1))?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

struct Inner {
    role: Role,
    sock: Sock,
    dispatcher: Arc<Dispatcher>,
    request_counter: AtomicU64,
}

impl Endpoint {
    /// Create an endpoint with the given role and default configuration.
    pub fn new(role: Role) -> Self {
        Self::with_config(role, SockConfig::default())
    }

    /// Create an endpoint with explicit retry configuration.
    pub fn with_config(role: Role, config: SockConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(role));
        let sock = Sock::new(config, dispatcher.clone());
        Self {
            inner: Arc::new(Inner {
                role,
                sock,
                dispatcher,
                request_counter: AtomicU64::new(0),
            }),
        }
    }

    /// The endpoint's role.
    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// Start a listener on `port`.
    ///
    /// Resolves once the socket is bound and listening and returns the
    /// actual bound port, so binding port 0 yields the ephemeral port the
    /// system chose. The bind callback fires with the same port.
    ///
    /// # Errors
    ///
    /// [`SockError::SocketSetup`] when socket creation, configuration, bind
    /// or listen fails (also reported to the error callback), and
    /// [`SockError::Closed`] after [`close`](Self::close).
    pub async fn bind(&self, port: u16) -> Result<u16, SockError> {
        self.inner.sock.bind(port).await
    }

    /// Start an outbound connector to `hostname:port`.
    ///
    /// Returns as soon as the connector is registered; the first connection
    /// attempt runs in the background and reconnection continues forever
    /// with exponential backoff.
    pub fn connect(&self, hostname: &str, port: u16) -> Result<(), SockError> {
        self.inner.sock.connect(hostname, port)
    }

    /// True when a connector was created for exactly this `(hostname, port)`
    /// pair, whether or not its link is currently up.
    pub fn is_connected(&self, hostname: &str, port: u16) -> bool {
        self.inner.sock.is_connected(hostname, port)
    }

    /// Send a message.
    ///
    /// Publishers broadcast to every live peer; pushers deliver to the next
    /// peer round-robin, the frame waiting in a background worker while no
    /// peer is live. Returns once the frame is scheduled.
    ///
    /// # Errors
    ///
    /// [`SockError::RoleMismatch`] unless the role is PUB or PUSH (a
    /// requester sends through [`request`](Self::request)).
    pub fn send(&self, message: Message) -> Result<(), SockError> {
        if !self.inner.role.can_send() {
            return Err(SockError::RoleMismatch {
                role: self.inner.role,
                operation: "send",
            });
        }
        let frame = message.encode()?;
        let destination = match self.inner.role {
            Role::Pub => Destination::Broadcast,
            _ => Destination::RoundRobin,
        };
        self.inner.sock.send(frame, destination)
    }

    /// Send a request and wait for the correlated reply.
    ///
    /// A unique id is appended to the outgoing message as its final string
    /// field; the matching reply (the replier echoes the id) resolves this
    /// call. Concurrent requests are independent.
    ///
    /// # Errors
    ///
    /// [`SockError::RoleMismatch`] unless the role is REQ,
    /// [`SockError::ReplyTimeout`] when no reply arrives within `timeout`
    /// (a later reply is silently discarded), and [`SockError::Closed`] when
    /// the endpoint is torn down while waiting.
    pub async fn request(&self, message: Message, timeout: Duration) -> Result<Message, SockError> {
        if self.inner.role != Role::Req {
            return Err(SockError::RoleMismatch {
                role: self.inner.role,
                operation: "request",
            });
        }

        let id = self.next_request_id();
        let mut message = message;
        message.push(Field::String(id.clone()));
        let frame = message.encode()?;

        let reply = self.inner.dispatcher.pending.register(&id);
        if let Err(error) = self.inner.sock.send(frame, Destination::RoundRobin) {
            self.inner.dispatcher.pending.remove(&id);
            return Err(error);
        }

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(SockError::Closed),
            Err(_) => {
                self.inner.dispatcher.pending.remove(&id);
                Err(SockError::ReplyTimeout { timeout })
            }
        }
    }

    /// Subscribe to topics matching `pattern` (a regular expression).
    ///
    /// The callback receives the topic and the message with the topic field
    /// already stripped. Subscribing again with the same pattern string
    /// replaces the callback in place.
    ///
    /// # Errors
    ///
    /// [`SockError::RoleMismatch`] unless the role is SUB or PULL, and
    /// [`SockError::InvalidPattern`] when the pattern does not compile.
    pub fn subscribe(
        &self,
        pattern: &str,
        callback: impl Fn(&str, &Message) + Send + Sync + 'static,
    ) -> Result<(), SockError> {
        if !self.inner.role.can_subscribe() {
            return Err(SockError::RoleMismatch {
                role: self.inner.role,
                operation: "subscribe",
            });
        }
        self.inner.dispatcher.subs.subscribe(pattern, Arc::new(callback))
    }

    /// Drop the subscription for `pattern`. Unsubscribing a pattern that was
    /// never registered is a no-op.
    ///
    /// # Errors
    ///
    /// [`SockError::RoleMismatch`] unless the role is SUB or PULL.
    pub fn unsubscribe(&self, pattern: &str) -> Result<(), SockError> {
        if !self.inner.role.can_subscribe() {
            return Err(SockError::RoleMismatch {
                role: self.inner.role,
                operation: "unsubscribe",
            });
        }
        self.inner.dispatcher.subs.unsubscribe(pattern);
        Ok(())
    }

    /// Register the bind callback, invoked with the actual port of every
    /// listener that comes up.
    pub fn on_bind(&self, callback: impl Fn(u16) + Send + Sync + 'static) {
        self.inner.dispatcher.callbacks.set_bind(Arc::new(callback));
    }

    /// Register the generic message callback.
    ///
    /// Subscribers and pullers receive every inbound message, before any
    /// topic handling. Requesters may register it, but replies are consumed
    /// by the correlator and never reach it.
    ///
    /// # Errors
    ///
    /// [`SockError::RoleMismatch`] unless the role is SUB, PULL or REQ
    /// (repliers register [`on_request`](Self::on_request) instead).
    pub fn on_message(
        &self,
        callback: impl Fn(&Message) + Send + Sync + 'static,
    ) -> Result<(), SockError> {
        if !self.inner.role.can_observe_messages() {
            return Err(SockError::RoleMismatch {
                role: self.inner.role,
                operation: "on_message",
            });
        }
        self.inner.dispatcher.callbacks.set_message(Arc::new(callback));
        Ok(())
    }

    /// Register the request callback of a replier.
    ///
    /// Invoked with each inbound request (its id already stripped); a
    /// returned message is sent back to the requesting peer with the id
    /// appended. Returning `None` sends nothing.
    ///
    /// # Errors
    ///
    /// [`SockError::RoleMismatch`] unless the role is REP.
    pub fn on_request(
        &self,
        callback: impl Fn(&Message) -> Option<Message> + Send + Sync + 'static,
    ) -> Result<(), SockError> {
        if self.inner.role != Role::Rep {
            return Err(SockError::RoleMismatch {
                role: self.inner.role,
                operation: "on_request",
            });
        }
        self.inner.dispatcher.callbacks.set_request(Arc::new(callback));
        Ok(())
    }

    /// Register the error callback, invoked with socket setup failures.
    pub fn on_error(&self, callback: impl Fn(&SockError) + Send + Sync + 'static) {
        self.inner.dispatcher.callbacks.set_error(Arc::new(callback));
    }

    /// Tear the endpoint down.
    ///
    /// Closes every listener, connector and peer connection and waits for
    /// their workers to finish; once this returns no further callback is
    /// invoked. Requests still in flight fail with [`SockError::Closed`].
    pub async fn close(&self) {
        self.inner.sock.close().await;
        self.inner.dispatcher.pending.drain();
    }

    /// Request ids on the wire are `"<pid>:<counter>"`, the counter being a
    /// per-endpoint monotonic integer incremented after use.
    fn next_request_id(&self) -> String {
        let counter = self.inner.request_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}:{}", std::process::id(), counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_rejected_for_receiving_roles() {
        for role in [Role::Sub, Role::Pull, Role::Rep, Role::Req] {
            let endpoint = Endpoint::new(role);
            let result = endpoint.send(Message::new().with_string("x"));
            assert!(
                matches!(result, Err(SockError::RoleMismatch { .. })),
                "{role} must not send"
            );
        }
    }

    #[tokio::test]
    async fn test_request_rejected_for_non_requesters() {
        for role in [Role::Pub, Role::Sub, Role::Push, Role::Pull, Role::Rep] {
            let endpoint = Endpoint::new(role);
            let result = endpoint
                .request(Message::new().with_string("x"), Duration::from_millis(10))
                .await;
            assert!(
                matches!(result, Err(SockError::RoleMismatch { .. })),
                "{role} must not request"
            );
        }
    }

    #[test]
    fn test_subscribe_rejected_outside_sub_and_pull() {
        for role in [Role::Pub, Role::Push, Role::Req, Role::Rep] {
            let endpoint = Endpoint::new(role);
            let result = endpoint.subscribe("news", |_, _| {});
            assert!(matches!(result, Err(SockError::RoleMismatch { .. })));
            let result = endpoint.unsubscribe("news");
            assert!(matches!(result, Err(SockError::RoleMismatch { .. })));
        }
    }

    #[test]
    fn test_message_callback_rejected_for_pub_push_rep() {
        for role in [Role::Pub, Role::Push, Role::Rep] {
            let endpoint = Endpoint::new(role);
            assert!(matches!(
                endpoint.on_message(|_| {}),
                Err(SockError::RoleMismatch { .. })
            ));
        }
        for role in [Role::Sub, Role::Pull, Role::Req] {
            let endpoint = Endpoint::new(role);
            assert!(endpoint.on_message(|_| {}).is_ok());
        }
    }

    #[test]
    fn test_request_callback_is_rep_only() {
        for role in [Role::Pub, Role::Sub, Role::Push, Role::Pull, Role::Req] {
            let endpoint = Endpoint::new(role);
            assert!(matches!(
                endpoint.on_request(|_| None),
                Err(SockError::RoleMismatch { .. })
            ));
        }
        let rep = Endpoint::new(Role::Rep);
        assert!(rep.on_request(|_| None).is_ok());
    }

    #[test]
    fn test_request_ids_are_pid_and_counter() {
        let endpoint = Endpoint::new(Role::Req);
        let first = endpoint.next_request_id();
        let second = endpoint.next_request_id();

        let pid = std::process::id().to_string();
        assert_eq!(first, format!("{pid}:0"));
        assert_eq!(second, format!("{pid}:1"));
    }

    #[test]
    fn test_request_counter_is_per_endpoint() {
        let endpoint = Endpoint::new(Role::Req);
        let other = Endpoint::new(Role::Req);

        assert!(endpoint.next_request_id().ends_with(":0"));
        assert!(endpoint.next_request_id().ends_with(":1"));
        // A fresh endpoint starts its own count.
        assert!(other.next_request_id().ends_with(":0"));
    }
}
