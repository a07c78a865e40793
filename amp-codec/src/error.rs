//! Error types for frame encoding and decoding.

use crate::message::{MAX_FIELD_SIZE, MAX_FIELDS};

/// Errors that can occur while encoding a message.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The message holds more fields than a frame can describe.
    #[error("too many fields: {count} (max {MAX_FIELDS})")]
    TooManyFields {
        /// Number of fields in the message.
        count: usize,
    },

    /// A single field payload exceeds the maximum allowed size.
    #[error("field too large: {size} bytes (max {MAX_FIELD_SIZE})")]
    FieldTooLarge {
        /// Payload size of the offending field in bytes.
        size: usize,
    },

    /// A JSON field could not be serialized.
    #[error("invalid json field: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while decoding a frame.
///
/// Note that a buffer ending in the middle of a frame is not an error;
/// [`Message::try_decode`](crate::Message::try_decode) reports it as
/// `Ok(None)` so the caller can wait for more bytes.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The version nibble of the meta byte is not supported.
    #[error("unsupported frame version: {version}")]
    UnsupportedVersion {
        /// The version found in the meta byte.
        version: u8,
    },

    /// A field length exceeds the maximum allowed size.
    #[error("field too large: {size} bytes (max {MAX_FIELD_SIZE})")]
    FieldTooLarge {
        /// Declared payload size of the offending field in bytes.
        size: usize,
    },

    /// A string field payload is not valid UTF-8.
    #[error("string field is not valid utf-8")]
    InvalidString,

    /// A JSON field payload failed to parse.
    #[error("invalid json field: {message}")]
    InvalidJson {
        /// Details from the JSON parser.
        message: String,
    },

    /// The buffer ended mid-frame where a whole frame was required.
    #[error("truncated frame")]
    Truncated,
}
