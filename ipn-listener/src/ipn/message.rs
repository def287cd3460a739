//! Callback message decoding.
//!
//! PayPal posts IPN callbacks as `application/x-www-form-urlencoded`. The
//! postback has to replay the fields in the order and encoding they arrived
//! in, so every field keeps its raw segment next to the decoded pair.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use thiserror::Error;
use url::form_urlencoded;

/// Why a callback body could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty body")]
    Empty,

    #[error("body is not valid UTF-8")]
    NotUtf8,

    #[error("malformed percent-encoding in field {index}")]
    MalformedEscape { index: usize },
}

/// One decoded form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Decoded field name
    pub name: String,
    /// Decoded field value
    pub value: String,
    /// The `name=value` segment exactly as received
    pub raw: String,
}

/// An IPN callback as received, in original field order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackMessage {
    fields: Vec<Field>,
    lookup: HashMap<String, usize>,
}

impl CallbackMessage {
    /// Decode a raw body, degrading to an empty message on any anomaly.
    pub fn decode(body: &[u8]) -> Self {
        Self::try_decode(body).unwrap_or_default()
    }

    /// Decode a raw body, reporting why it was rejected.
    pub fn try_decode(body: &[u8]) -> Result<Self, DecodeError> {
        if body.is_empty() {
            return Err(DecodeError::Empty);
        }

        let text = std::str::from_utf8(body).map_err(|_| DecodeError::NotUtf8)?;

        let mut fields = Vec::new();
        for (index, segment) in text.split('&').filter(|s| !s.is_empty()).enumerate() {
            if !has_valid_escapes(segment) {
                return Err(DecodeError::MalformedEscape { index });
            }

            let (name, value) = form_urlencoded::parse(segment.as_bytes())
                .next()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .unwrap_or_default();

            fields.push(Field {
                name,
                value,
                raw: segment.to_string(),
            });
        }

        Ok(Self::from_fields(fields))
    }

    fn from_fields(fields: Vec<Field>) -> Self {
        // Later duplicates overwrite earlier ones.
        let lookup = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();

        Self { fields, lookup }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Fields in the order they were received.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a decoded value by name. The last occurrence wins.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.lookup
            .get(name)
            .map(|&i| self.fields[i].value.as_str())
    }

    /// Gateway transaction identifier, if the callback carries one.
    pub fn txn_id(&self) -> Option<&str> {
        self.get("txn_id").filter(|v| !v.is_empty())
    }

    /// Re-encode the fields in original order, byte-for-byte as received.
    pub fn encode(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.raw.as_str())
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Hex SHA-256 of the encoded body, stable across redeliveries.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.encode().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Decoded `(name, value)` pairs, in order.
    pub fn pairs(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .map(|f| (f.name.as_str(), f.value.as_str()))
            .collect()
    }
}

/// Every `%` must be followed by two hex digits.
fn has_valid_escapes(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            match (bytes.get(i + 1), bytes.get(i + 2)) {
                (Some(a), Some(b)) if a.is_ascii_hexdigit() && b.is_ascii_hexdigit() => i += 3,
                _ => return false,
            }
        } else {
            i += 1;
        }
    }
    true
}
