//! Generic publish/subscribe transport abstraction
//!
//! This crate provides a transport-agnostic interface for topic-based
//! messaging. Specific transport implementations (in-memory, MQTT, etc.) are
//! provided in separate crates.
//!
//! Transports handle:
//! - Publishing raw payloads to named topics
//! - Topic subscriptions with at-most-once delivery
//! - Surfacing inbound messages as an event stream
//! - Surfacing connection lifecycle events
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

pub use error::TransportError as Error;
pub use error::TransportError;

/// An inbound message delivered by the transport.
#[derive(Debug, Clone)]
pub struct TransportMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// The raw message payload.
    pub payload: Bytes,
}

/// Delivery semantics requested for a subscription.
///
/// `AtMostOnce` means a message may be lost but is never redelivered. The
/// routing layer only ever asks for `AtMostOnce`; `AtLeastOnce` exists for
/// transports that support acknowledged delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Fire-and-forget. Messages may be lost but never duplicated.
    #[default]
    AtMostOnce,
    /// Redelivered until acknowledged, if the transport supports it.
    AtLeastOnce,
}

/// Options for a topic subscription.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Requested delivery semantics.
    pub delivery: DeliveryMode,
}

/// Connection lifecycle events surfaced by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A session with the broker was established.
    Connect,
    /// The connection reported an error.
    Error(String),
    /// The transport is attempting to re-establish a lost session.
    Reconnect,
    /// The broker disconnected the session.
    Disconnect,
    /// The underlying connection closed.
    Close,
    /// The transport went offline.
    Offline,
    /// The session ended and will not be re-established.
    End,
}

/// Transport trait for topic-based publish/subscribe messaging.
///
/// Topic matching is by exact, case-sensitive string equality. A message
/// published to a topic is delivered to every connection currently
/// subscribed to that exact topic, in whatever order the transport chooses.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publish a payload to a topic.
    ///
    /// Publishing to a topic nobody subscribes to is not an error; the
    /// payload is simply dropped.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError>;

    /// Subscribe this connection to a topic.
    ///
    /// Subscribing twice to the same topic is idempotent.
    async fn subscribe(
        &self,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<(), TransportError>;

    /// Remove this connection's subscription to a topic.
    ///
    /// Unsubscribing from a topic that was never subscribed is a no-op.
    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;

    /// Get the stream of inbound messages for this connection.
    ///
    /// Messages arrive in delivery order. The stream should be consumed by a
    /// single task; taking it more than once splits delivery between the
    /// takers.
    fn incoming(&self) -> Pin<Box<dyn Stream<Item = TransportMessage> + Send>>;

    /// Get the stream of connection lifecycle events.
    fn lifecycle(&self) -> Pin<Box<dyn Stream<Item = LifecycleEvent> + Send>>;

    /// Shut the transport down, ending the session.
    async fn shutdown(&self) -> Result<(), TransportError>;
}
