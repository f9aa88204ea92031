//! Wire framing for request and response payloads
//!
//! Requests travel as a single JSON object with three named sections,
//! `{"qs": ..., "headers": ..., "body": ...}`, with absent sections omitted
//! entirely (an empty request is `{}`). JSON responses travel as
//! `{"statusCode": ..., "body": ...}`; binary responses are raw unwrapped bytes
//! and therefore cannot carry a status code.
//!
//! Payloads that do not parse as the expected JSON shape decode in raw-bytes
//! mode rather than failing, mirroring the transport's view of a payload as
//! opaque bytes.

use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::status::StatusCode;

/// A header value: either a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// Textual header value.
    Str(String),
    /// Numeric header value, e.g. `content-length`.
    Int(i64),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

/// The JSON shape of a request payload.
///
/// `deny_unknown_fields` keeps the decoder honest: a JSON object that is not
/// this exact shape falls back to raw-bytes mode instead of silently
/// decoding as an empty request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestWire {
    /// Query parameters.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub qs: HashMap<String, String>,
    /// Request headers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, HeaderValue>,
    /// JSON request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// The JSON shape of a response payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseWire {
    /// HTTP status code.
    #[serde(rename = "statusCode")]
    pub status_code: StatusCode,
    /// JSON response body.
    pub body: Value,
}

/// A decoded request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRequest {
    /// A structured JSON request.
    Structured(RequestWire),
    /// An opaque binary request.
    Raw(Bytes),
}

/// A decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedResponse {
    /// A framed JSON response.
    Json {
        /// Status code from the envelope.
        status_code: StatusCode,
        /// Body from the envelope.
        body: Value,
    },
    /// A raw binary response.
    Binary(Bytes),
}

/// Encodes a request envelope to its wire bytes.
///
/// # Errors
/// Returns `Error::Codec` if the body cannot be serialized.
pub fn encode_request(wire: &RequestWire) -> Result<Bytes> {
    Ok(serde_json::to_vec(wire)?.into())
}

/// Decodes a request payload, falling back to raw-bytes mode for anything
/// that is not a structured request object.
#[must_use]
pub fn decode_request(payload: &Bytes) -> DecodedRequest {
    match serde_json::from_slice::<RequestWire>(payload) {
        Ok(wire) => DecodedRequest::Structured(wire),
        Err(_) => DecodedRequest::Raw(payload.clone()),
    }
}

/// Encodes a JSON response envelope to its wire bytes.
///
/// # Errors
/// Returns `Error::Codec` if the body cannot be serialized.
pub fn encode_response(status_code: StatusCode, body: &Value) -> Result<Bytes> {
    let wire = ResponseWire {
        status_code,
        body: body.clone(),
    };
    Ok(serde_json::to_vec(&wire)?.into())
}

/// Decodes a response payload, falling back to binary for anything that is
/// not a framed JSON response.
#[must_use]
pub fn decode_response(payload: &Bytes) -> DecodedResponse {
    match serde_json::from_slice::<ResponseWire>(payload) {
        Ok(wire) => DecodedResponse::Json {
            status_code: wire.status_code,
            body: wire.body,
        },
        Err(_) => DecodedResponse::Binary(payload.clone()),
    }
}
