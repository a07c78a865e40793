//! # amp-codec
//!
//! Codec for AMP frames: compact, self-delimiting messages made of typed
//! fields.
//!
//! A frame carries up to 15 fields, each one of four kinds:
//!
//! | Kind | Payload on the wire |
//! |------|---------------------|
//! | [`Field::Blob`] | raw bytes |
//! | [`Field::String`] | `s:` prefix + UTF-8 bytes |
//! | [`Field::BigInt`] | `b:` prefix + 8-byte big-endian two's-complement |
//! | [`Field::Json`] | `j:` prefix + UTF-8 JSON text |
//!
//! Frame layout: one meta byte `(version << 4) | field_count`, then per field
//! a `u32` big-endian byte length followed by the field payload.
//!
//! Frames are self-delimiting, so several of them can sit back to back in a
//! single read buffer. [`Message::try_decode`] consumes exactly one frame and
//! reports how many bytes it used, returning `Ok(None)` when the buffer ends
//! mid-frame:
//!
//! ```
//! use amp_codec::Message;
//!
//! let msg = Message::new().with_string("news").with_bigint(7);
//! let bytes = msg.encode().expect("encode");
//!
//! // Partial data is not an error, just "feed me more".
//! assert!(try_partial(&bytes[..3]));
//!
//! let (decoded, consumed) = Message::try_decode(&bytes)
//!     .expect("decode")
//!     .expect("complete frame");
//! assert_eq!(decoded, msg);
//! assert_eq!(consumed, bytes.len());
//!
//! fn try_partial(buf: &[u8]) -> bool {
//!     matches!(Message::try_decode(buf), Ok(None))
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod error;
mod field;
mod message;

pub use error::{DecodeError, EncodeError};
pub use field::Field;
pub use message::{MAX_FIELD_SIZE, MAX_FIELDS, Message, VERSION};

// The payload type of JSON fields, re-exported so callers do not need a
// direct serde_json dependency to build messages.
pub use serde_json::Value;
