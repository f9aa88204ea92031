//! Client-side request correlator
//!
//! Performs outbound calls and matches incoming replies to the caller
//! awaiting them. Correlation uses the ticket pattern: pending calls queue
//! FIFO per reply topic, and each arriving reply pops and resolves exactly
//! one ticket, so a later unrelated reply can never re-resolve a completed
//! call. Reply-topic subscriptions are reference-counted by queue length and
//! dropped when the last pending call for the topic completes.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use topica_transport::{
    LifecycleEvent, SubscribeOptions, Transport, TransportError, TransportMessage,
};
use tracing::{debug, info, warn};

use crate::envelope::{self, DecodedResponse, HeaderValue, RequestWire};
use crate::error::{Error, Result};
use crate::method::Method;
use crate::path::normalize;
use crate::status::StatusCode;
use crate::topic;

/// Configuration for a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound applied to calls that do not carry their own timeout.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-call options.
///
/// Query parameters belong in `query_params`, not in the path string. A call
/// with `raw` set publishes those bytes unframed and ignores the JSON
/// sections.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Request headers.
    pub headers: Option<HashMap<String, HeaderValue>>,
    /// Query parameters.
    pub query_params: Option<HashMap<String, String>>,
    /// JSON request body.
    pub body: Option<Value>,
    /// Raw binary payload, published unframed.
    pub raw: Option<Bytes>,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
}

/// Body of a decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// JSON body from a framed response envelope.
    Json(Value),
    /// Raw bytes from a binary response.
    Binary(Bytes),
}

/// A decoded reply to a client call.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    reply_topic: String,
    status_code: Option<StatusCode>,
    body: ResponseBody,
}

impl ClientResponse {
    fn decode(reply_topic: &str, payload: &Bytes) -> Self {
        match envelope::decode_response(payload) {
            DecodedResponse::Json { status_code, body } => Self {
                reply_topic: reply_topic.to_string(),
                status_code: Some(status_code),
                body: ResponseBody::Json(body),
            },
            DecodedResponse::Binary(bytes) => Self {
                reply_topic: reply_topic.to_string(),
                // Binary responses are unwrapped bytes; no envelope, no code.
                status_code: None,
                body: ResponseBody::Binary(bytes),
            },
        }
    }

    /// Reply topic the response arrived on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.reply_topic
    }

    /// Status code, for framed JSON responses.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        self.status_code
    }

    /// The decoded body.
    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// The JSON body, if this was a framed response.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Binary(_) => None,
        }
    }

    /// The raw bytes, if this was a binary response.
    #[must_use]
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.body {
            ResponseBody::Binary(bytes) => Some(bytes),
            ResponseBody::Json(_) => None,
        }
    }
}

struct PendingCall {
    ticket: u64,
    tx: oneshot::Sender<Result<ClientResponse>>,
}

type PendingMap = HashMap<String, VecDeque<PendingCall>>;

/// A client bound to one transport connection.
pub struct Client {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    pending: Arc<Mutex<PendingMap>>,
    ticket_counter: AtomicU64,
    task_tracker: TaskTracker,
    cancellation: CancellationToken,
}

impl Client {
    /// Creates a client over a transport connection and starts its reply
    /// router.
    ///
    /// # Errors
    /// Returns `Error::Configuration` if the request timeout is zero.
    pub fn new(transport: impl Transport, config: ClientConfig) -> Result<Self> {
        if config.request_timeout.is_zero() {
            return Err(Error::Configuration(
                "request timeout must be non-zero".to_string(),
            ));
        }

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let task_tracker = TaskTracker::new();
        let cancellation = CancellationToken::new();

        {
            let incoming = transport.incoming();
            let pending = pending.clone();
            let transport = transport.clone();
            let cancellation = cancellation.clone();

            task_tracker.spawn(async move {
                tokio::select! {
                    () = reply_loop(incoming, pending, transport) => {
                        warn!("Reply loop exited: transport message stream ended");
                    }
                    () = cancellation.cancelled() => {
                        debug!("Reply loop cancelled");
                    }
                }
            });
        }

        {
            let lifecycle = transport.lifecycle();
            let pending = pending.clone();
            let cancellation = cancellation.clone();

            task_tracker.spawn(async move {
                tokio::select! {
                    () = lifecycle_loop(lifecycle, pending) => {}
                    () = cancellation.cancelled() => {
                        debug!("Lifecycle loop cancelled");
                    }
                }
            });
        }

        Ok(Self {
            transport,
            config,
            pending,
            ticket_counter: AtomicU64::new(0),
            task_tracker,
            cancellation,
        })
    }

    /// Issues a request and awaits its correlated reply.
    ///
    /// The reply-topic subscription and the pending ticket are registered
    /// before the request is published, so a reply arriving immediately is
    /// never lost.
    ///
    /// # Errors
    /// `Error::Transport` if the subscribe or publish fails,
    /// `Error::Timeout` if no reply arrives within the bound, and
    /// `Error::Transport` if a transport error fails the call while pending.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        options: CallOptions,
    ) -> Result<ClientResponse> {
        let path = normalize(path);
        let request_topic = topic::request_topic(method, &path);
        let reply_topic = topic::reply_topic(method, &path);

        let CallOptions {
            headers,
            query_params,
            body,
            raw,
            timeout,
        } = options;

        let payload = match raw {
            Some(bytes) => bytes,
            None => envelope::encode_request(&RequestWire {
                qs: query_params.unwrap_or_default(),
                headers: headers.unwrap_or_default(),
                body,
            })?,
        };
        let timeout_duration = timeout.unwrap_or(self.config.request_timeout);

        let ticket = self.ticket_counter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            let needs_subscribe = pending
                .get(&reply_topic)
                .is_none_or(VecDeque::is_empty);
            if needs_subscribe {
                if let Err(error) = self
                    .transport
                    .subscribe(&reply_topic, SubscribeOptions::default())
                    .await
                {
                    pending.remove(&reply_topic);
                    return Err(error.into());
                }
                debug!("Awaiting replies on {reply_topic}");
            }
            pending
                .entry(reply_topic.clone())
                .or_default()
                .push_back(PendingCall { ticket, tx });
        }

        if let Err(error) = self.transport.publish(&request_topic, payload).await {
            self.abandon(&reply_topic, ticket).await;
            return Err(error.into());
        }
        debug!("Published request on {request_topic}");

        match tokio::time::timeout(timeout_duration, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.abandon(&reply_topic, ticket).await;
                Err(Error::ChannelClosed("reply channel dropped".to_string()))
            }
            Err(_) => {
                self.abandon(&reply_topic, ticket).await;
                Err(Error::Timeout(timeout_duration))
            }
        }
    }

    /// Issues a GET request.
    ///
    /// # Errors
    /// Same as [`Client::call`].
    pub async fn get(&self, path: &str, options: CallOptions) -> Result<ClientResponse> {
        self.call(Method::Get, path, options).await
    }

    /// Issues a POST request.
    ///
    /// # Errors
    /// Same as [`Client::call`].
    pub async fn post(&self, path: &str, options: CallOptions) -> Result<ClientResponse> {
        self.call(Method::Post, path, options).await
    }

    /// Issues a PUT request.
    ///
    /// # Errors
    /// Same as [`Client::call`].
    pub async fn put(&self, path: &str, options: CallOptions) -> Result<ClientResponse> {
        self.call(Method::Put, path, options).await
    }

    /// Issues a PATCH request.
    ///
    /// # Errors
    /// Same as [`Client::call`].
    pub async fn patch(&self, path: &str, options: CallOptions) -> Result<ClientResponse> {
        self.call(Method::Patch, path, options).await
    }

    /// Issues a DELETE request.
    ///
    /// # Errors
    /// Same as [`Client::call`].
    pub async fn delete(&self, path: &str, options: CallOptions) -> Result<ClientResponse> {
        self.call(Method::Delete, path, options).await
    }

    /// Closes the client: stops its loops, fails still-pending calls, and
    /// shuts the transport down.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the transport shutdown fails.
    pub async fn close(&self) -> Result<()> {
        self.cancellation.cancel();
        self.task_tracker.close();

        let drained: Vec<PendingCall> = {
            let mut pending = self.pending.lock().await;
            pending.drain().flat_map(|(_, queue)| queue).collect()
        };
        for call in drained {
            let _ = call
                .tx
                .send(Err(Error::ChannelClosed("client closed".to_string())));
        }

        self.transport.shutdown().await?;
        self.task_tracker.wait().await;
        info!("Client closed");
        Ok(())
    }

    /// Removes one ticket; drops the reply-topic subscription if it was the
    /// last.
    async fn abandon(&self, reply_topic: &str, ticket: u64) {
        let mut pending = self.pending.lock().await;
        let drained = match pending.get_mut(reply_topic) {
            Some(queue) => {
                queue.retain(|call| call.ticket != ticket);
                queue.is_empty()
            }
            None => false,
        };
        if drained {
            pending.remove(reply_topic);
            if let Err(error) = self.transport.unsubscribe(reply_topic).await {
                warn!("Failed to unsubscribe from {reply_topic}: {error}");
            }
        }
    }
}

async fn reply_loop(
    mut incoming: Pin<Box<dyn Stream<Item = TransportMessage> + Send>>,
    pending: Arc<Mutex<PendingMap>>,
    transport: Arc<dyn Transport>,
) {
    while let Some(message) = incoming.next().await {
        let call = {
            let mut pending = pending.lock().await;
            let (call, drained) = match pending.get_mut(&message.topic) {
                Some(queue) => (queue.pop_front(), queue.is_empty()),
                None => (None, false),
            };
            if drained {
                pending.remove(&message.topic);
                // Unsubscribed under the lock so a concurrent call cannot
                // re-subscribe in between and lose its subscription.
                if let Err(error) = transport.unsubscribe(&message.topic).await {
                    warn!("Failed to unsubscribe from {}: {error}", message.topic);
                }
            }
            call
        };

        match call {
            Some(call) => {
                let response = ClientResponse::decode(&message.topic, &message.payload);
                debug!("Resolved pending call on {}", message.topic);
                if call.tx.send(Ok(response)).is_err() {
                    debug!("Pending call was abandoned before its reply arrived");
                }
            }
            None => warn!("Reply on {} with no pending call", message.topic),
        }
    }
}

async fn lifecycle_loop(
    mut lifecycle: Pin<Box<dyn Stream<Item = LifecycleEvent> + Send>>,
    pending: Arc<Mutex<PendingMap>>,
) {
    while let Some(event) = lifecycle.next().await {
        match event {
            LifecycleEvent::Error(reason) => {
                let drained: Vec<PendingCall> = {
                    let mut pending = pending.lock().await;
                    pending.drain().flat_map(|(_, queue)| queue).collect()
                };
                if !drained.is_empty() {
                    warn!(
                        "Transport error failed {} pending call(s): {reason}",
                        drained.len()
                    );
                }
                for call in drained {
                    let _ = call.tx.send(Err(Error::Transport(
                        TransportError::ConnectionFailed(reason.clone()),
                    )));
                }
            }
            other => debug!("Client lifecycle event: {other:?}"),
        }
    }
}
