//! Untrusted token header model.
//!
//! A token header is attacker-controlled input. It is kept as a map from
//! field name to a tagged [`HeaderValue`], and every read goes through
//! [`TokenHeader::string`], which reports a missing or mistyped field as an
//! explicit [`HeaderFieldError`] instead of assuming a type.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any decoding (DoS prevention)
//! - Parsing the header does NOT verify the signature; a resolved key must
//!   still be used to verify the token

use crate::error::{HeaderError, HeaderFieldError};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// Maximum allowed JWT size in bytes (8KB).
///
/// Larger tokens are rejected before base64 decoding or JSON parsing.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Header field naming the signing algorithm.
pub const ALG: &str = "alg";

/// Header field naming the key-set URL.
pub const JKU: &str = "jku";

/// Header field naming the key identifier.
pub const KID: &str = "kid";

/// A single header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    String(String),
    Number(Number),
    Bool(bool),
    Null,
    /// Arrays and objects (e.g. an embedded `jwk`).
    Structured(Value),
}

impl HeaderValue {
    /// Name of the value's type, for error reporting.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            HeaderValue::String(_) => "string",
            HeaderValue::Number(_) => "number",
            HeaderValue::Bool(_) => "boolean",
            HeaderValue::Null => "null",
            HeaderValue::Structured(Value::Array(_)) => "array",
            HeaderValue::Structured(_) => "object",
        }
    }
}

impl From<Value> for HeaderValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => HeaderValue::String(s),
            Value::Number(n) => HeaderValue::Number(n),
            Value::Bool(b) => HeaderValue::Bool(b),
            Value::Null => HeaderValue::Null,
            other => HeaderValue::Structured(other),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

/// Decoded, unverified token header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenHeader {
    fields: HashMap<String, HeaderValue>,
}

impl TokenHeader {
    /// Parse the header of a compact-serialized JWT without verifying it.
    ///
    /// # Errors
    ///
    /// - `TokenTooLarge` - token exceeds `MAX_JWT_SIZE_BYTES`
    /// - `MalformedToken` - not three segments, bad base64url, or the header
    ///   is not a JSON object
    pub fn parse(token: &str) -> Result<Self, HeaderError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "jku.header",
                token_size = token.len(),
                max_size = MAX_JWT_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(HeaderError::TokenTooLarge);
        }

        let mut parts = token.split('.');
        let (Some(header_part), Some(_payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            tracing::debug!(target: "jku.header", "Token rejected: invalid JWT format");
            return Err(HeaderError::MalformedToken);
        };

        let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
            tracing::debug!(target: "jku.header", error = %e, "Failed to decode JWT header base64");
            HeaderError::MalformedToken
        })?;

        let header: Map<String, Value> = serde_json::from_slice(&header_bytes).map_err(|e| {
            tracing::debug!(target: "jku.header", error = %e, "Failed to parse JWT header JSON");
            HeaderError::MalformedToken
        })?;

        Ok(Self::from_json(header))
    }

    /// Build a header from an already-parsed JSON object.
    #[must_use]
    pub fn from_json(header: Map<String, Value>) -> Self {
        Self {
            fields: header
                .into_iter()
                .map(|(name, value)| (name, HeaderValue::from(value)))
                .collect(),
        }
    }

    /// Build a header from name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<HeaderValue>,
    {
        Self {
            fields: pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }

    /// Raw access to a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.fields.get(name)
    }

    /// Read a field that must be present and a string.
    ///
    /// # Errors
    ///
    /// - `Missing` - the field is absent
    /// - `WrongType` - the field holds a non-string value
    pub fn string(&self, name: &str) -> Result<&str, HeaderFieldError> {
        match self.fields.get(name) {
            Some(HeaderValue::String(s)) => Ok(s),
            Some(other) => Err(HeaderFieldError::WrongType {
                field: name.to_string(),
                expected: "string",
                found: other.type_name(),
            }),
            None => Err(HeaderFieldError::Missing {
                field: name.to_string(),
            }),
        }
    }

    /// The declared signing algorithm (`alg`).
    ///
    /// # Errors
    ///
    /// See [`TokenHeader::string`].
    pub fn algorithm(&self) -> Result<&str, HeaderFieldError> {
        self.string(ALG)
    }

    /// The key-set URL (`jku`).
    ///
    /// # Errors
    ///
    /// See [`TokenHeader::string`].
    pub fn key_set_url(&self) -> Result<&str, HeaderFieldError> {
        self.string(JKU)
    }

    /// The key identifier (`kid`).
    ///
    /// # Errors
    ///
    /// See [`TokenHeader::string`].
    pub fn key_id(&self) -> Result<&str, HeaderFieldError> {
        self.string(KID)
    }
}
