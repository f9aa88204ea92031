//! Error types for the transport layer

use thiserror::Error;

/// Transport operation errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection is closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Publishing a payload failed
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// Creating or removing a subscription failed
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Topic name rejected by the transport
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Other transport error
    #[error("Transport error: {0}")]
    Other(String),
}
