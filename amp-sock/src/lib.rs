//! # amp-sock
//!
//! Message-oriented sockets over framed TCP, wire compatible with the AMP
//! messaging family: publish/subscribe, push/pull and request/reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              Application Code                    │
//! │     Endpoint: bind / connect / send / request    │
//! ├─────────────────────────────────────────────────┤
//! │     Dispatcher (role routing)                    │
//! │     • decodes frames, per-connection FIFO        │
//! │     • topics, request/reply correlation          │
//! ├─────────────────────────────────────────────────┤
//! │     Sock (connection management)                 │
//! │     • listeners, reconnecting connectors         │
//! │     • broadcast / round-robin / unicast sends    │
//! ├─────────────────────────────────────────────────┤
//! │     amp-codec (framing)                          │
//! │     • typed fields: blob, string, bigint, json   │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`Endpoint`] | One messaging participant with a fixed [`Role`] |
//! | [`Message`] / [`Field`] | Typed multi-field messages |
//! | [`SockConfig`] | Reconnection and retry tuning |
//! | [`SockError`] | Everything an operation can fail with |
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use amp_sock::{Endpoint, Field, Message, Role};
//!
//! # async fn run() -> Result<(), amp_sock::SockError> {
//! // Replier answers every request with one string field.
//! let rep = Endpoint::new(Role::Rep);
//! rep.on_request(|_request| Some(Message::new().with_string("world")))?;
//! rep.bind(3002).await?;
//!
//! // Requester connects and asks.
//! let req = Endpoint::new(Role::Req);
//! req.connect("127.0.0.1", 3002)?;
//! let reply = req
//!     .request(Message::new().with_string("hello"), Duration::from_secs(5))
//!     .await?;
//! assert_eq!(reply.first().and_then(Field::as_str), Some("world"));
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod config;
mod dispatch;
mod endpoint;
mod error;
mod pending;
mod role;
mod sock;
mod subs;

pub use amp_codec::{DecodeError, EncodeError, Field, Message, Value};
pub use config::SockConfig;
pub use dispatch::{
    BindCallback, ErrorCallback, MessageCallback, RequestCallback, SubscriptionCallback,
};
pub use endpoint::Endpoint;
pub use error::SockError;
pub use role::{ParseRoleError, Role};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, ignoring poisoning: a panicked callback must not wedge the
/// engine's shared state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
