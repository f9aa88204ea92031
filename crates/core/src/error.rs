//! Error types for the routing layer

use std::time::Duration;

use thiserror::Error;
use topica_transport::TransportError;

/// Routing layer errors
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A route with the same topic key already exists
    #[error("Route {topic} already exists")]
    DuplicateRoute {
        /// The colliding topic key
        topic: String,
    },

    /// Operation requires an active session
    #[error("Not connected to any broker, did you forget to call .connect()?")]
    NotConnected,

    /// Transport layer error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Reconnect retry budget depleted
    #[error("Reconnect retry budget of {retries} exhausted")]
    RetriesExhausted {
        /// The configured retry budget
        retries: u32,
    },

    /// Client call unanswered within its bound
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Wire payload could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Status code outside the 100..=511 range
    #[error("Invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// Unrecognized HTTP method name
    #[error("Invalid method: {0}")]
    InvalidMethod(String),

    /// Internal channel closed unexpectedly
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
