//! HTTP-style request routing over publish/subscribe transports
//!
//! This crate overlays request/response semantics on a topic-based
//! transport. It handles:
//! - Path normalization and topic-key derivation
//! - Route tables with duplicate detection and nested route groups
//! - Per-message dispatch with ordered, short-circuiting middleware chains
//! - Request/response envelope framing
//! - Client-side correlation of replies to outstanding calls
//!
//! The layer is transport-agnostic and works with any implementation of the
//! `topica_transport::Transport` trait. Delivery guarantees, cross-topic
//! ordering, and exactly-once semantics remain properties of the chosen
//! transport.
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod method;
pub mod path;
pub mod request;
pub mod response;
pub mod router;
pub mod server;
pub mod status;
pub mod topic;

// Re-export commonly used types
pub use client::{CallOptions, Client, ClientConfig, ClientResponse, ResponseBody};
pub use envelope::HeaderValue;
pub use error::{Error, Result};
pub use handler::{Handler, middleware};
pub use method::Method;
pub use request::{Context, Request};
pub use response::Response;
pub use router::{Route, Router};
pub use server::{Server, ServerConfig};
pub use status::StatusCode;
