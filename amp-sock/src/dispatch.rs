//! Frame decoding and role-specific routing.
//!
//! The dispatcher sits behind the connection manager's [`SockHandler`] seam.
//! For every chunk of bytes read off a peer it drains whole frames from the
//! connection's buffer, decodes them, and routes each message according to
//! the endpoint's role.

use std::sync::{Arc, Mutex};

use amp_codec::{Field, Message};

use crate::error::SockError;
use crate::lock;
use crate::pending::PendingRequests;
use crate::role::Role;
use crate::sock::{Destination, PeerId, Sock, SockHandler};
use crate::subs::SubscriptionList;

/// Callback invoked when a listener comes up, with the actual bound port.
pub type BindCallback = dyn Fn(u16) + Send + Sync;

/// Callback invoked with every inbound message (subscriber and puller
/// endpoints).
pub type MessageCallback = dyn Fn(&Message) + Send + Sync;

/// Callback invoked with every inbound request (replier endpoints); the
/// returned message, if any, is sent back to the requester.
pub type RequestCallback = dyn Fn(&Message) -> Option<Message> + Send + Sync;

/// Callback invoked with a matching topic message: `(topic, message)`.
pub type SubscriptionCallback = dyn Fn(&str, &Message) + Send + Sync;

/// Callback invoked when a socket setup failure is reported.
pub type ErrorCallback = dyn Fn(&SockError) + Send + Sync;

/// The endpoint's registered callback slots.
#[derive(Default)]
pub(crate) struct Callbacks {
    bind: Mutex<Option<Arc<BindCallback>>>,
    message: Mutex<Option<Arc<MessageCallback>>>,
    request: Mutex<Option<Arc<RequestCallback>>>,
    error: Mutex<Option<Arc<ErrorCallback>>>,
}

impl Callbacks {
    pub(crate) fn set_bind(&self, callback: Arc<BindCallback>) {
        *lock(&self.bind) = Some(callback);
    }

    pub(crate) fn set_message(&self, callback: Arc<MessageCallback>) {
        *lock(&self.message) = Some(callback);
    }

    pub(crate) fn set_request(&self, callback: Arc<RequestCallback>) {
        *lock(&self.request) = Some(callback);
    }

    pub(crate) fn set_error(&self, callback: Arc<ErrorCallback>) {
        *lock(&self.error) = Some(callback);
    }

    fn bind(&self) -> Option<Arc<BindCallback>> {
        lock(&self.bind).clone()
    }

    fn message(&self) -> Option<Arc<MessageCallback>> {
        lock(&self.message).clone()
    }

    fn request(&self) -> Option<Arc<RequestCallback>> {
        lock(&self.request).clone()
    }

    fn error(&self) -> Option<Arc<ErrorCallback>> {
        lock(&self.error).clone()
    }
}

/// Role-specific routing of decoded messages.
pub(crate) struct Dispatcher {
    role: Role,
    pub(crate) callbacks: Callbacks,
    pub(crate) pending: PendingRequests,
    pub(crate) subs: SubscriptionList,
}

impl Dispatcher {
    pub(crate) fn new(role: Role) -> Self {
        Self {
            role,
            callbacks: Callbacks::default(),
            pending: PendingRequests::default(),
            subs: SubscriptionList::default(),
        }
    }

    fn route(&self, sock: &Sock, peer: PeerId, mut message: Message) {
        match self.role {
            Role::Req => {
                // The trailing field is the request id echoed by the replier.
                let Some(Field::String(id)) = message.pop_field() else {
                    tracing::debug!("reply without trailing id, dropping");
                    return;
                };
                self.pending.fulfill(&id, message);
            }

            Role::Rep => {
                let Some(Field::String(id)) = message.pop_field() else {
                    tracing::debug!("request without trailing id, dropping");
                    return;
                };
                let Some(callback) = self.callbacks.request() else {
                    return;
                };
                if let Some(mut reply) = callback(&message) {
                    // Echo the request id as the reply's last field so the
                    // requester can correlate it.
                    reply.push(Field::String(id));
                    match reply.encode() {
                        Ok(frame) => {
                            let _ = sock.send(frame, Destination::Peer(peer));
                        }
                        Err(error) => tracing::warn!(%error, "unable to encode reply"),
                    }
                }
            }

            Role::Sub | Role::Pull => {
                if let Some(callback) = self.callbacks.message() {
                    callback(&message);
                }
                self.subs.dispatch(&mut message);
            }

            // These roles only transmit; stray inbound frames are ignored.
            Role::Pub | Role::Push => {}
        }
    }
}

impl SockHandler for Dispatcher {
    fn on_bound(&self, port: u16) {
        if let Some(callback) = self.callbacks.bind() {
            callback(port);
        }
    }

    fn on_data(&self, sock: &Sock, peer: PeerId, buf: &mut Vec<u8>) {
        let mut offset = 0;
        loop {
            match Message::try_decode(&buf[offset..]) {
                Ok(Some((message, consumed))) => {
                    offset += consumed;
                    if message.is_empty() {
                        tracing::debug!(peer = peer.0, "zero-field message dropped");
                        continue;
                    }
                    self.route(sock, peer, message);
                }
                Ok(None) => break,
                Err(error) => {
                    // The offending bytes are discarded; the link survives.
                    tracing::warn!(peer = peer.0, %error, "frame decode failed, discarding buffer");
                    buf.clear();
                    return;
                }
            }
        }
        buf.drain(..offset);
    }

    fn on_error(&self, error: &SockError) {
        if let Some(callback) = self.callbacks.error() {
            callback(error);
        }
    }
}
