//! In-memory transport implementation for testing
//!
//! This transport routes messages between connections within the same
//! process, perfect for testing and development scenarios. Connections are
//! created from an explicitly constructed [`MemoryBroker`] rather than a
//! process-wide registry, so independent tests never share state.

use std::collections::HashSet;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::Stream;
use topica_transport::{
    LifecycleEvent, SubscribeOptions, Transport, TransportError, TransportMessage,
};
use tracing::{debug, info};
use uuid::Uuid;

/// Per-connection state held by the broker.
struct BrokerConnection {
    topics: Mutex<HashSet<String>>,
    message_tx: flume::Sender<TransportMessage>,
}

/// An in-process message broker.
///
/// Cloning the broker is cheap; clones share the same connection registry.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    connections: Arc<DashMap<Uuid, BrokerConnection>>,
}

impl MemoryBroker {
    /// Creates a new broker with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new connection to the broker.
    #[must_use]
    pub fn connect(&self) -> MemoryTransport {
        let id = Uuid::new_v4();
        let (message_tx, message_rx) = flume::unbounded();
        let (lifecycle_tx, lifecycle_rx) = flume::unbounded();

        // Emitted before the caller can take the lifecycle stream, so the
        // event is waiting in the channel rather than lost.
        let _ = lifecycle_tx.send(LifecycleEvent::Connect);

        self.connections.insert(
            id,
            BrokerConnection {
                topics: Mutex::new(HashSet::new()),
                message_tx,
            },
        );

        info!("Memory connection {id} attached");

        MemoryTransport {
            id,
            connections: self.connections.clone(),
            message_rx,
            lifecycle_rx,
            lifecycle_tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of currently attached connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Memory transport implementation
///
/// Clones share the same connection; the inbound message stream competes
/// between clones, so only one clone should consume [`Transport::incoming`].
#[derive(Clone)]
pub struct MemoryTransport {
    id: Uuid,
    connections: Arc<DashMap<Uuid, BrokerConnection>>,
    message_rx: flume::Receiver<TransportMessage>,
    lifecycle_rx: flume::Receiver<LifecycleEvent>,
    lifecycle_tx: flume::Sender<LifecycleEvent>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish()
    }
}

impl MemoryTransport {
    /// Connection id assigned by the broker.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Pushes a lifecycle event into this connection's event stream.
    ///
    /// Useful in tests to simulate broker-side conditions (reconnect storms,
    /// connection errors) that the in-memory broker never produces itself.
    pub fn inject_lifecycle(&self, event: LifecycleEvent) {
        let _ = self.lifecycle_tx.send(event);
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), TransportError> {
        self.ensure_open()?;

        let message = TransportMessage {
            topic: topic.to_string(),
            payload,
        };

        let mut delivered = 0usize;
        for entry in self.connections.iter() {
            let subscribed = entry
                .topics
                .lock()
                .map(|topics| topics.contains(topic))
                .unwrap_or(false);
            if subscribed {
                // A receiver that went away mid-send is equivalent to a
                // subscriber that disconnected; the message is just lost.
                if entry.message_tx.send(message.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }

        debug!("Published {topic} to {delivered} subscriber(s)");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        _options: SubscribeOptions,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;

        let connection = self
            .connections
            .get(&self.id)
            .ok_or(TransportError::ConnectionClosed)?;
        connection
            .topics
            .lock()
            .map_err(|_| TransportError::Other("subscription set poisoned".to_string()))?
            .insert(topic.to_string());

        debug!("Connection {} subscribed to {topic}", self.id);
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.ensure_open()?;

        let connection = self
            .connections
            .get(&self.id)
            .ok_or(TransportError::ConnectionClosed)?;
        connection
            .topics
            .lock()
            .map_err(|_| TransportError::Other("subscription set poisoned".to_string()))?
            .remove(topic);

        debug!("Connection {} unsubscribed from {topic}", self.id);
        Ok(())
    }

    fn incoming(&self) -> Pin<Box<dyn Stream<Item = TransportMessage> + Send>> {
        Box::pin(self.message_rx.clone().into_stream())
    }

    fn lifecycle(&self) -> Pin<Box<dyn Stream<Item = LifecycleEvent> + Send>> {
        Box::pin(self.lifecycle_rx.clone().into_stream())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.connections.remove(&self.id);
        let _ = self.lifecycle_tx.send(LifecycleEvent::Close);
        let _ = self.lifecycle_tx.send(LifecycleEvent::End);

        info!("Memory connection {} shut down", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::StreamExt;
    use tokio::time::{Duration, timeout};

    #[tokio::test]
    async fn test_publish_subscribe_round_trip() {
        let _ = tracing_subscriber::fmt::try_init();

        let broker = MemoryBroker::new();
        let publisher = broker.connect();
        let subscriber = broker.connect();

        subscriber
            .subscribe("alpha", SubscribeOptions::default())
            .await
            .unwrap();

        let mut incoming = subscriber.incoming();
        publisher
            .publish("alpha", Bytes::from("payload"))
            .await
            .unwrap();

        let message = timeout(Duration::from_secs(1), incoming.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.topic, "alpha");
        assert_eq!(message.payload, Bytes::from("payload"));
    }

    #[tokio::test]
    async fn test_exact_topic_match_only() {
        let _ = tracing_subscriber::fmt::try_init();

        let broker = MemoryBroker::new();
        let publisher = broker.connect();
        let subscriber = broker.connect();

        subscriber
            .subscribe("alpha/beta", SubscribeOptions::default())
            .await
            .unwrap();

        let mut incoming = subscriber.incoming();
        publisher
            .publish("alpha", Bytes::from("wrong"))
            .await
            .unwrap();
        publisher
            .publish("alpha/beta/gamma", Bytes::from("wrong"))
            .await
            .unwrap();
        publisher
            .publish("alpha/beta", Bytes::from("right"))
            .await
            .unwrap();

        let message = timeout(Duration::from_secs(1), incoming.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.payload, Bytes::from("right"));
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let _ = tracing_subscriber::fmt::try_init();

        let broker = MemoryBroker::new();
        let publisher = broker.connect();
        let subscriber = broker.connect();

        subscriber
            .subscribe("alpha", SubscribeOptions::default())
            .await
            .unwrap();
        subscriber.unsubscribe("alpha").await.unwrap();

        let mut incoming = subscriber.incoming();
        publisher
            .publish("alpha", Bytes::from("dropped"))
            .await
            .unwrap();

        let result = timeout(Duration::from_millis(100), incoming.next()).await;
        assert!(result.is_err(), "message should not be delivered");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let broker = MemoryBroker::new();
        let publisher = broker.connect();

        publisher
            .publish("nobody", Bytes::from("dropped"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_emits_close_and_end() {
        let _ = tracing_subscriber::fmt::try_init();

        let broker = MemoryBroker::new();
        let transport = broker.connect();

        let mut lifecycle = transport.lifecycle();
        assert_eq!(lifecycle.next().await, Some(LifecycleEvent::Connect));

        transport.shutdown().await.unwrap();
        assert_eq!(lifecycle.next().await, Some(LifecycleEvent::Close));
        assert_eq!(lifecycle.next().await, Some(LifecycleEvent::End));

        assert_eq!(broker.connection_count(), 0);
        assert!(matches!(
            transport.publish("alpha", Bytes::new()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
