//! Typed message fields.

use serde_json::Value;

/// One typed field of an AMP message.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Arbitrary bytes.
    Blob(Vec<u8>),
    /// A UTF-8 string.
    String(String),
    /// A signed 64-bit integer.
    BigInt(i64),
    /// A JSON document.
    Json(Value),
}

impl Field {
    /// The string value, if this is a string field.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Field::String(s) => Some(s),
            _ => None,
        }
    }

    /// The raw bytes, if this is a blob field.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Field::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// The integer value, if this is a bigint field.
    pub fn as_bigint(&self) -> Option<i64> {
        match self {
            Field::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// The JSON value, if this is a JSON field.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Field::Json(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for Field {
    fn from(value: &str) -> Self {
        Field::String(value.to_owned())
    }
}

impl From<String> for Field {
    fn from(value: String) -> Self {
        Field::String(value)
    }
}

impl From<i64> for Field {
    fn from(value: i64) -> Self {
        Field::BigInt(value)
    }
}

impl From<Vec<u8>> for Field {
    fn from(value: Vec<u8>) -> Self {
        Field::Blob(value)
    }
}

impl From<Value> for Field {
    fn from(value: Value) -> Self {
        Field::Json(value)
    }
}
