//! The message container and its wire format.

use crate::error::{DecodeError, EncodeError};
use crate::field::Field;
use serde_json::Value;

/// Frame format version carried in the high nibble of the meta byte.
pub const VERSION: u8 = 1;

/// Maximum number of fields one frame can carry (the count nibble).
pub const MAX_FIELDS: usize = 15;

/// Maximum size of a single field payload (1 MiB).
///
/// Larger declared lengths are rejected so a malformed frame cannot force an
/// unbounded allocation.
pub const MAX_FIELD_SIZE: usize = 1024 * 1024;

const STRING_PREFIX: &[u8; 2] = b"s:";
const JSON_PREFIX: &[u8; 2] = b"j:";
const BIGINT_PREFIX: &[u8; 2] = b"b:";

/// Wire size of a bigint payload: prefix + 8 bytes big-endian.
const BIGINT_PAYLOAD_SIZE: usize = 10;

/// An ordered sequence of typed fields, encodable as one AMP frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    fields: Vec<Field>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field.
    pub fn push(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Append a blob field, builder style.
    pub fn with_blob(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.fields.push(Field::Blob(bytes.into()));
        self
    }

    /// Append a string field, builder style.
    pub fn with_string(mut self, value: impl Into<String>) -> Self {
        self.fields.push(Field::String(value.into()));
        self
    }

    /// Append a bigint field, builder style.
    pub fn with_bigint(mut self, value: i64) -> Self {
        self.fields.push(Field::BigInt(value));
        self
    }

    /// Append a JSON field, builder style.
    pub fn with_json(mut self, value: Value) -> Self {
        self.fields.push(Field::Json(value));
        self
    }

    /// The fields in order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the message has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The first field, if any.
    pub fn first(&self) -> Option<&Field> {
        self.fields.first()
    }

    /// The last field, if any.
    pub fn last(&self) -> Option<&Field> {
        self.fields.last()
    }

    /// Remove and return the last field.
    pub fn pop_field(&mut self) -> Option<Field> {
        self.fields.pop()
    }

    /// Remove and return the first field.
    pub fn shift_field(&mut self) -> Option<Field> {
        if self.fields.is_empty() {
            return None;
        }
        Some(self.fields.remove(0))
    }

    /// Consume the message, yielding its fields.
    pub fn into_fields(self) -> Vec<Field> {
        self.fields
    }

    /// Encode the message as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::TooManyFields`] when the message exceeds
    /// [`MAX_FIELDS`] and [`EncodeError::FieldTooLarge`] when a field payload
    /// exceeds [`MAX_FIELD_SIZE`].
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.fields.len() > MAX_FIELDS {
            return Err(EncodeError::TooManyFields {
                count: self.fields.len(),
            });
        }

        let mut out = Vec::with_capacity(64);
        out.push((VERSION << 4) | self.fields.len() as u8);

        for field in &self.fields {
            match field {
                Field::Blob(bytes) => {
                    push_payload(&mut out, None, bytes)?;
                }
                Field::String(value) => {
                    push_payload(&mut out, Some(STRING_PREFIX), value.as_bytes())?;
                }
                Field::BigInt(value) => {
                    push_payload(&mut out, Some(BIGINT_PREFIX), &value.to_be_bytes())?;
                }
                Field::Json(value) => {
                    let text = serde_json::to_vec(value)?;
                    push_payload(&mut out, Some(JSON_PREFIX), &text)?;
                }
            }
        }

        Ok(out)
    }

    /// Decode one frame from the front of `buf`.
    ///
    /// Returns the message together with the number of bytes consumed, so
    /// frames concatenated in one buffer can be decoded sequentially. A
    /// successful decode always consumes at least one byte.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((message, consumed)))` when a complete frame was parsed
    /// - `Ok(None)` when the buffer ends mid-frame (wait for more bytes)
    /// - `Err` when the data is malformed
    pub fn try_decode(buf: &[u8]) -> Result<Option<(Message, usize)>, DecodeError> {
        let Some(&meta) = buf.first() else {
            return Ok(None);
        };

        let version = meta >> 4;
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion { version });
        }

        let count = (meta & 0x0f) as usize;
        let mut fields = Vec::with_capacity(count);
        let mut offset = 1usize;

        for _ in 0..count {
            let Some(header) = buf.get(offset..offset + 4) else {
                return Ok(None);
            };
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            if len > MAX_FIELD_SIZE {
                return Err(DecodeError::FieldTooLarge { size: len });
            }
            let Some(payload) = buf.get(offset + 4..offset + 4 + len) else {
                return Ok(None);
            };
            fields.push(classify_payload(payload)?);
            offset += 4 + len;
        }

        Ok(Some((Message { fields }, offset)))
    }

    /// Decode the first frame of `buf`, requiring it to be complete.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] when `buf` ends mid-frame, or any
    /// other [`DecodeError`] for malformed data.
    pub fn decode(buf: &[u8]) -> Result<Message, DecodeError> {
        match Self::try_decode(buf)? {
            Some((message, _consumed)) => Ok(message),
            None => Err(DecodeError::Truncated),
        }
    }
}

fn push_payload(out: &mut Vec<u8>, prefix: Option<&[u8; 2]>, data: &[u8]) -> Result<(), EncodeError> {
    let size = data.len() + prefix.map_or(0, |p| p.len());
    if size > MAX_FIELD_SIZE {
        return Err(EncodeError::FieldTooLarge { size });
    }
    out.extend_from_slice(&(size as u32).to_be_bytes());
    if let Some(prefix) = prefix {
        out.extend_from_slice(prefix);
    }
    out.extend_from_slice(data);
    Ok(())
}

/// Classify a field payload by its type prefix.
///
/// Payloads with no recognized prefix are blobs. A blob that happens to start
/// with a prefix reads back as that kind; the ambiguity is part of the format.
fn classify_payload(payload: &[u8]) -> Result<Field, DecodeError> {
    if payload.len() == BIGINT_PAYLOAD_SIZE && payload.starts_with(BIGINT_PREFIX) {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&payload[2..]);
        return Ok(Field::BigInt(i64::from_be_bytes(raw)));
    }
    if let Some(rest) = payload.strip_prefix(STRING_PREFIX.as_slice()) {
        let value = std::str::from_utf8(rest).map_err(|_| DecodeError::InvalidString)?;
        return Ok(Field::String(value.to_owned()));
    }
    if let Some(rest) = payload.strip_prefix(JSON_PREFIX.as_slice()) {
        let value = serde_json::from_slice(rest).map_err(|e| DecodeError::InvalidJson {
            message: e.to_string(),
        })?;
        return Ok(Field::Json(value));
    }
    Ok(Field::Blob(payload.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roundtrip_all_field_kinds() {
        let msg = Message::new()
            .with_blob(vec![0x00, 0xff, 0x10])
            .with_string("hello")
            .with_bigint(-42)
            .with_json(json!({"v": 1}));

        let bytes = msg.encode().expect("encode");
        let (decoded, consumed) = Message::try_decode(&bytes)
            .expect("decode")
            .expect("complete frame");

        assert_eq!(decoded, msg);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_frame_layout() {
        let msg = Message::new().with_string("ab");
        let bytes = msg.encode().expect("encode");

        // Meta byte: version 1, one field.
        assert_eq!(bytes[0], 0x11);
        // Field length: "s:" + "ab" = 4 bytes, big-endian u32.
        assert_eq!(&bytes[1..5], &[0, 0, 0, 4]);
        assert_eq!(&bytes[5..], b"s:ab");
    }

    #[test]
    fn test_bigint_big_endian() {
        let msg = Message::new().with_bigint(1);
        let bytes = msg.encode().expect("encode");

        assert_eq!(&bytes[1..5], &[0, 0, 0, 10]);
        assert_eq!(&bytes[5..7], b"b:");
        assert_eq!(&bytes[7..], &[0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn test_unprefixed_payload_is_blob() {
        let msg = Message::new().with_blob(b"raw data".to_vec());
        let bytes = msg.encode().expect("encode");
        let (decoded, _) = Message::try_decode(&bytes)
            .expect("decode")
            .expect("complete frame");

        assert_eq!(decoded.fields(), &[Field::Blob(b"raw data".to_vec())]);
    }

    #[test]
    fn test_partial_buffer_needs_more_data() {
        let msg = Message::new().with_string("payload");
        let bytes = msg.encode().expect("encode");

        for cut in 0..bytes.len() {
            let result = Message::try_decode(&bytes[..cut]).expect("partial is not an error");
            assert!(result.is_none(), "cut at {cut} should need more data");
        }
    }

    #[test]
    fn test_concatenated_frames_decode_sequentially() {
        let first = Message::new().with_string("one");
        let second = Message::new().with_bigint(2);

        let mut buf = first.encode().expect("encode");
        buf.extend_from_slice(&second.encode().expect("encode"));

        let (decoded, consumed) = Message::try_decode(&buf)
            .expect("decode")
            .expect("first frame");
        assert_eq!(decoded, first);

        let (decoded, rest) = Message::try_decode(&buf[consumed..])
            .expect("decode")
            .expect("second frame");
        assert_eq!(decoded, second);
        assert_eq!(consumed + rest, buf.len());
    }

    #[test]
    fn test_decode_always_makes_progress() {
        let msg = Message::new();
        let bytes = msg.encode().expect("encode");

        let (decoded, consumed) = Message::try_decode(&bytes)
            .expect("decode")
            .expect("complete frame");
        assert!(decoded.is_empty());
        assert!(consumed >= 1);
    }

    #[test]
    fn test_too_many_fields_rejected() {
        let mut msg = Message::new();
        for i in 0..16 {
            msg.push(Field::BigInt(i));
        }

        let result = msg.encode();
        assert!(matches!(result, Err(EncodeError::TooManyFields { count: 16 })));
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let msg = Message::new().with_string("x");
        let mut bytes = msg.encode().expect("encode");
        bytes[0] = (2 << 4) | 1;

        let result = Message::try_decode(&bytes);
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedVersion { version: 2 })
        ));
    }

    #[test]
    fn test_oversized_field_length_rejected() {
        let mut bytes = vec![0x11];
        bytes.extend_from_slice(&(MAX_FIELD_SIZE as u32 + 1).to_be_bytes());

        let result = Message::try_decode(&bytes);
        assert!(matches!(result, Err(DecodeError::FieldTooLarge { .. })));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let mut bytes = vec![0x11];
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(b"j:{x}");

        let result = Message::try_decode(&bytes);
        assert!(matches!(result, Err(DecodeError::InvalidJson { .. })));
    }

    #[test]
    fn test_invalid_utf8_string_rejected() {
        let mut bytes = vec![0x11];
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(b"s:");
        bytes.extend_from_slice(&[0xff, 0xfe]);

        let result = Message::try_decode(&bytes);
        assert!(matches!(result, Err(DecodeError::InvalidString)));
    }

    #[test]
    fn test_short_bigint_prefix_is_blob() {
        // "b:" without exactly eight trailing bytes is not a bigint.
        let mut bytes = vec![0x11];
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(b"b:xy");

        let (decoded, _) = Message::try_decode(&bytes)
            .expect("decode")
            .expect("complete frame");
        assert_eq!(decoded.fields(), &[Field::Blob(b"b:xy".to_vec())]);
    }

    #[test]
    fn test_strip_first_and_last() {
        let mut msg = Message::new()
            .with_string("topic")
            .with_json(json!({"k": true}))
            .with_string("1234:0");

        let id = msg.pop_field().expect("last field");
        assert_eq!(id.as_str(), Some("1234:0"));

        let topic = msg.shift_field().expect("first field");
        assert_eq!(topic.as_str(), Some("topic"));

        assert_eq!(msg.len(), 1);
        assert_eq!(msg.first().and_then(Field::as_json), Some(&json!({"k": true})));
    }

    #[test]
    fn test_empty_buffer_needs_more_data() {
        assert!(Message::try_decode(&[]).expect("empty is not an error").is_none());
    }
}
