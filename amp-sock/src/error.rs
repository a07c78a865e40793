//! Error types for the messaging engine.

use std::io;
use std::time::Duration;

use crate::Role;

/// Errors surfaced by endpoint operations.
///
/// Link drops, decode failures and undeliverable round-robin frames are
/// recovered internally (reconnect, discard, drop) and never reach the
/// caller; what remains is reported here or through the error callback.
#[derive(Debug, thiserror::Error)]
pub enum SockError {
    /// The operation is not part of the endpoint's role.
    #[error("{role} endpoints do not support {operation}")]
    RoleMismatch {
        /// Role of the endpoint the operation was invoked on.
        role: Role,
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// Listener socket setup failed.
    ///
    /// `stage` is one of `create`, `configure`, `bind` or `listen`.
    #[error("unable to {stage} listener socket: {source}")]
    SocketSetup {
        /// The setup step that failed.
        stage: &'static str,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },

    /// No reply arrived before the request deadline.
    #[error("no reply within {timeout:?}")]
    ReplyTimeout {
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The endpoint has been closed.
    #[error("endpoint closed")]
    Closed,

    /// The outgoing message could not be encoded.
    #[error(transparent)]
    Encode(#[from] amp_codec::EncodeError),

    /// The subscription pattern is not a valid regular expression.
    #[error("invalid subscription pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
