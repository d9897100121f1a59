// src/model/body.rs
//! Message bodies
//!
//! A body is raw bytes, UTF-8 text, a structured JSON value, or absent.
//! Whatever the variant, it can always be read back as bytes and as
//! (lossy) text; JSON is available when the content parses.
//!
//! Inside the proxy's JSON envelope a body is a JSON value, a string, or
//! `null`. Bytes that are not valid UTF-8 travel as base64 and are flagged
//! with [`WireEncoding::Base64`] next to the value.

use crate::utils::errors::{FirewallError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encoding of a string body inside the envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    Base64,
}

/// Request or response body
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Bytes(Bytes),
    Text(String),
    Json(Value),
}

impl Body {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Text(text) => text.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Raw bytes; JSON is serialized compactly
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Self::Empty => Bytes::new(),
            Self::Bytes(bytes) => bytes.clone(),
            Self::Text(text) => Bytes::from(text.clone()),
            Self::Json(value) => Bytes::from(value.to_string()),
        }
    }

    /// UTF-8 text, replacing invalid sequences
    pub fn to_text(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Text(text) => text.clone(),
            Self::Json(value) => value.to_string(),
        }
    }

    /// Structured value; an empty body reads as `null`
    pub fn to_json(&self) -> Result<Value> {
        match self {
            Self::Empty => Ok(Value::Null),
            Self::Bytes(bytes) => Ok(serde_json::from_slice(bytes)?),
            Self::Text(text) => Ok(serde_json::from_str(text)?),
            Self::Json(value) => Ok(value.clone()),
        }
    }

    /// Representation carried in the proxy's JSON envelope
    pub fn to_wire(&self) -> (Value, Option<WireEncoding>) {
        match self {
            Self::Empty => (Value::Null, None),
            Self::Json(value) => (value.clone(), None),
            Self::Text(text) => (Value::String(text.clone()), None),
            Self::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => (Value::String(text.to_string()), None),
                Err(_) => (
                    Value::String(BASE64.encode(bytes)),
                    Some(WireEncoding::Base64),
                ),
            },
        }
    }

    /// Inverse of [`Body::to_wire`]
    pub fn from_wire(value: Value, encoding: Option<WireEncoding>) -> Result<Self> {
        match (value, encoding) {
            (Value::String(encoded), Some(WireEncoding::Base64)) => BASE64
                .decode(encoded.as_bytes())
                .map(|bytes| Self::Bytes(Bytes::from(bytes)))
                .map_err(|e| FirewallError::InvalidRequest(format!("Invalid base64 body: {}", e))),
            (_, Some(WireEncoding::Base64)) => Err(FirewallError::InvalidRequest(
                "base64 body must be a string".to_string(),
            )),
            (Value::Null, None) => Ok(Self::Empty),
            (Value::String(text), None) => Ok(Self::Text(text)),
            (other, None) => Ok(Self::Json(other)),
        }
    }

    /// Decode an upstream payload: JSON when declared as such and parseable,
    /// then UTF-8 text, raw bytes otherwise
    pub fn decode(bytes: Bytes, is_json: bool) -> Self {
        if bytes.is_empty() {
            return Self::Text(String::new());
        }
        if is_json {
            if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
                return Self::Json(value);
            }
        }
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Self::Text(text),
            Err(_) => Self::Bytes(bytes),
        }
    }

    /// Text handed to the security detectors
    pub fn render(&self) -> String {
        match self {
            Self::Empty => "None".to_string(),
            other => other.to_text(),
        }
    }

    /// Parse into a caller type, straight from the raw content when there is
    /// one so duplicate object keys reach the target type's deserializer
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Empty => Ok(serde_json::from_value(Value::Null)?),
            Self::Bytes(bytes) => Ok(serde_json::from_slice(bytes)?),
            Self::Text(text) => Ok(serde_json::from_str(text)?),
            Self::Json(value) => Ok(T::deserialize(value)?),
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}
