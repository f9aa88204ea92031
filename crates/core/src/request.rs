//! Inbound request representation

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use serde_json::Value;

use crate::envelope::{self, DecodedRequest, HeaderValue};
use crate::method::Method;
use crate::topic;

/// An opaque per-request context bag.
///
/// Middlewares use it to pass values to later middlewares and the
/// controller. Cloning shares the underlying storage.
#[derive(Debug, Clone, Default)]
pub struct Context {
    values: Arc<RwLock<HashMap<String, Value>>>,
}

impl Context {
    /// Stores a value under a key, replacing any previous value.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.into(), value);
        }
    }

    /// Returns a clone of the value stored under a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.read().ok().and_then(|values| values.get(key).cloned())
    }

    /// Removes and returns the value stored under a key.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.values.write().ok().and_then(|mut values| values.remove(key))
    }
}

#[derive(Debug)]
struct RequestParts {
    qs: HashMap<String, String>,
    headers: HashMap<String, HeaderValue>,
    body: Option<Value>,
    raw: Option<Bytes>,
    method: Option<Method>,
    path: Option<String>,
}

/// An inbound request, built fresh for every transport message.
///
/// Cloning is cheap and shares the decoded payload and context bag; every
/// inbound message gets its own `Request`, never reused across dispatches.
#[derive(Debug, Clone)]
pub struct Request {
    parts: Arc<RequestParts>,
    ctx: Context,
}

impl Request {
    /// Decodes a request from a transport message.
    ///
    /// Structured JSON payloads populate query/header/body sections and
    /// infer method and path from the topic key; anything else is carried
    /// as raw bytes.
    #[must_use]
    pub fn from_message(topic: &str, payload: &Bytes) -> Self {
        let parts = match envelope::decode_request(payload) {
            DecodedRequest::Structured(wire) => {
                let (method, path) = match topic::parse_request_topic(topic) {
                    Some((method, path)) => (Some(method), Some(path)),
                    None => (None, None),
                };
                RequestParts {
                    qs: wire.qs,
                    headers: wire.headers,
                    body: wire.body,
                    raw: None,
                    method,
                    path,
                }
            }
            DecodedRequest::Raw(raw) => RequestParts {
                qs: HashMap::new(),
                headers: HashMap::new(),
                body: None,
                raw: Some(raw),
                method: None,
                path: None,
            },
        };

        Self {
            parts: Arc::new(parts),
            ctx: Context::default(),
        }
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &HashMap<String, String> {
        &self.parts.qs
    }

    /// A single query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.parts.qs.get(name).map(String::as_str)
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HashMap<String, HeaderValue> {
        &self.parts.headers
    }

    /// A single header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.parts.headers.get(name)
    }

    /// JSON request body, if the request was structured.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.parts.body.as_ref()
    }

    /// Raw payload bytes, if the request was binary.
    #[must_use]
    pub fn raw(&self) -> Option<&Bytes> {
        self.parts.raw.as_ref()
    }

    /// Method inferred from the topic key.
    #[must_use]
    pub fn method(&self) -> Option<Method> {
        self.parts.method
    }

    /// Normalized path inferred from the topic key.
    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.parts.path.as_deref()
    }

    /// The per-request context bag.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.ctx
    }
}
