//! Server-side dispatcher
//!
//! Binds a route table to a live transport session. Each route subscribes to
//! its topic key; inbound messages are matched by exact topic lookup and
//! dispatched on their own task, running the route's middleware chain
//! strictly in order ahead of the controller.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{Stream, StreamExt};
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use topica_transport::{LifecycleEvent, SubscribeOptions, Transport, TransportMessage};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::method::Method;
use crate::path::normalize;
use crate::request::Request;
use crate::response::Response;
use crate::router::{Route, Router};
use crate::topic;

/// Configuration for a server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// How many `reconnect` lifecycle events to tolerate before the server
    /// reports itself terminated.
    pub reconnect_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            reconnect_retries: 3,
        }
    }
}

type RouteTable = Arc<RwLock<HashMap<String, Arc<Route>>>>;
type TerminalSender = watch::Sender<Option<Arc<Error>>>;

/// A server bound to one transport connection.
pub struct Server {
    transport: Arc<dyn Transport>,
    config: ServerConfig,
    connected: AtomicBool,
    routes: RouteTable,
    terminal_tx: TerminalSender,
    task_tracker: TaskTracker,
    cancellation: CancellationToken,
}

impl Server {
    /// Creates a server over a transport connection.
    ///
    /// No subscriptions exist until [`Server::connect`] is called; route
    /// registration before then fails with `Error::NotConnected`.
    #[must_use]
    pub fn new(transport: impl Transport, config: ServerConfig) -> Self {
        let (terminal_tx, _) = watch::channel(None);
        Self {
            transport: Arc::new(transport),
            config,
            connected: AtomicBool::new(false),
            routes: Arc::new(RwLock::new(HashMap::new())),
            terminal_tx,
            task_tracker: TaskTracker::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Establishes the session: starts the dispatch and lifecycle loops.
    ///
    /// Calling `connect` twice is a no-op.
    ///
    /// # Errors
    /// Currently infallible; the `Result` reserves the right for transports
    /// with an explicit session handshake.
    pub async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        {
            let incoming = self.transport.incoming();
            let routes = self.routes.clone();
            let transport = self.transport.clone();
            let cancellation = self.cancellation.clone();

            self.task_tracker.spawn(async move {
                tokio::select! {
                    () = dispatch_loop(incoming, routes, transport) => {
                        warn!("Dispatch loop exited: transport message stream ended");
                    }
                    () = cancellation.cancelled() => {
                        debug!("Dispatch loop cancelled");
                    }
                }
            });
        }

        {
            let lifecycle = self.transport.lifecycle();
            let budget = self.config.reconnect_retries;
            let terminal_tx = self.terminal_tx.clone();
            let cancellation = self.cancellation.clone();

            self.task_tracker.spawn(async move {
                tokio::select! {
                    () = lifecycle_loop(lifecycle, budget, terminal_tx) => {}
                    () = cancellation.cancelled() => {
                        debug!("Lifecycle loop cancelled");
                    }
                }
            });
        }

        info!("Server connected");
        Ok(())
    }

    /// Ends the session: stops the loops and shuts the transport down.
    ///
    /// # Errors
    /// Returns `Error::Transport` if the transport shutdown fails.
    pub async fn disconnect(&self) -> Result<()> {
        self.cancellation.cancel();
        self.task_tracker.close();
        self.transport.shutdown().await?;
        self.task_tracker.wait().await;
        self.connected.store(false, Ordering::SeqCst);
        info!("Server disconnected");
        Ok(())
    }

    /// Resolves when the server reaches a terminal error, e.g. the
    /// reconnect retry budget is exhausted.
    pub async fn terminated(&self) -> Arc<Error> {
        let mut rx = self.terminal_tx.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                if let Some(error) = current.as_ref() {
                    return error.clone();
                }
            }
            if rx.changed().await.is_err() {
                return Arc::new(Error::ChannelClosed(
                    "terminal state watch closed".to_string(),
                ));
            }
        }
    }

    /// Registers a route and subscribes to its topic key.
    ///
    /// # Errors
    /// `Error::NotConnected` before [`Server::connect`];
    /// `Error::DuplicateRoute` on a topic-key collision (table unchanged);
    /// `Error::Transport` if the subscription fails (the entry is rolled
    /// back).
    pub async fn route(
        &self,
        method: Method,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.ensure_connected()?;

        let path = normalize(path);
        let key = topic::request_topic(method, &path);
        {
            let mut table = self.routes.write().await;
            if table.contains_key(&key) {
                return Err(Error::DuplicateRoute { topic: key });
            }
            table.insert(
                key.clone(),
                Arc::new(Route {
                    method,
                    path,
                    controller: Arc::new(controller),
                    middlewares,
                }),
            );
        }

        if let Err(error) = self
            .transport
            .subscribe(&key, SubscribeOptions::default())
            .await
        {
            self.routes.write().await.remove(&key);
            return Err(error.into());
        }

        info!("Listening for route {key}");
        Ok(())
    }

    /// Registers a GET route.
    ///
    /// # Errors
    /// Same as [`Server::route`].
    pub async fn get(
        &self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Get, path, controller, middlewares).await
    }

    /// Registers a POST route.
    ///
    /// # Errors
    /// Same as [`Server::route`].
    pub async fn post(
        &self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Post, path, controller, middlewares)
            .await
    }

    /// Registers a PUT route.
    ///
    /// # Errors
    /// Same as [`Server::route`].
    pub async fn put(
        &self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Put, path, controller, middlewares).await
    }

    /// Registers a PATCH route.
    ///
    /// # Errors
    /// Same as [`Server::route`].
    pub async fn patch(
        &self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Patch, path, controller, middlewares)
            .await
    }

    /// Registers a DELETE route.
    ///
    /// # Errors
    /// Same as [`Server::route`].
    pub async fn delete(
        &self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Delete, path, controller, middlewares)
            .await
    }

    /// Merges an externally built router's table and subscribes each merged
    /// route.
    ///
    /// The merge is duplicate-checked against the server's table before any
    /// mutation. If a subscription fails partway, routes already subscribed
    /// stay bound; the failed route and the not-yet-subscribed remainder are
    /// rolled back.
    ///
    /// # Errors
    /// `Error::NotConnected`, `Error::DuplicateRoute`, or
    /// `Error::Transport` as for [`Server::route`].
    pub async fn apply_router(&self, router: Router) -> Result<()> {
        self.ensure_connected()?;

        let routes = router.into_routes();
        let keys: Vec<String> = {
            let mut table = self.routes.write().await;
            for key in routes.keys() {
                if table.contains_key(key) {
                    return Err(Error::DuplicateRoute { topic: key.clone() });
                }
            }
            for (key, route) in &routes {
                table.insert(key.clone(), route.clone());
            }
            routes.keys().cloned().collect()
        };

        for (index, key) in keys.iter().enumerate() {
            if let Err(error) = self
                .transport
                .subscribe(key, SubscribeOptions::default())
                .await
            {
                let mut table = self.routes.write().await;
                for unbound in &keys[index..] {
                    table.remove(unbound);
                }
                return Err(error.into());
            }
            info!("Listening for route {key}");
        }
        Ok(())
    }

    /// Number of currently bound routes.
    pub async fn route_count(&self) -> usize {
        self.routes.read().await.len()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }
}

async fn dispatch_loop(
    mut incoming: Pin<Box<dyn Stream<Item = TransportMessage> + Send>>,
    routes: RouteTable,
    transport: Arc<dyn Transport>,
) {
    while let Some(message) = incoming.next().await {
        let route = routes.read().await.get(&message.topic).cloned();
        let Some(route) = route else {
            debug!("No route bound for topic {}", message.topic);
            continue;
        };

        let transport = transport.clone();
        tokio::spawn(async move {
            let topic = message.topic.clone();
            if let Err(error) = dispatch_message(route, message, transport).await {
                // Per-message failures never take the dispatch loop down.
                error!("Request on {topic} failed: {error}");
            }
        });
    }
}

async fn dispatch_message(
    route: Arc<Route>,
    message: TransportMessage,
    transport: Arc<dyn Transport>,
) -> Result<()> {
    let request = Request::from_message(&message.topic, &message.payload);
    let response = Response::new(transport, &message.topic);

    for middleware in route.middlewares() {
        middleware.call(request.clone(), response.clone()).await?;
        if response.has_been_sent() {
            debug!(
                "Middleware sent the response on {}; short-circuiting",
                response.topic()
            );
            return Ok(());
        }
    }

    route.controller.call(request, response).await
}

async fn lifecycle_loop(
    mut lifecycle: Pin<Box<dyn Stream<Item = LifecycleEvent> + Send>>,
    budget: u32,
    terminal_tx: TerminalSender,
) {
    let mut remaining = budget;
    while let Some(event) = lifecycle.next().await {
        match event {
            LifecycleEvent::Connect => info!("Transport session established"),
            LifecycleEvent::Error(reason) => error!("Transport error: {reason}"),
            LifecycleEvent::Reconnect => {
                if remaining == 0 {
                    let error = Arc::new(Error::RetriesExhausted { retries: budget });
                    error!("{error}");
                    // send_replace stores the value even with no receiver
                    // subscribed yet, so a later terminated() still sees it.
                    terminal_tx.send_replace(Some(error));
                    return;
                }
                remaining -= 1;
                info!("Trying to reconnect ({remaining} retries left)");
            }
            LifecycleEvent::Disconnect => info!("Transport disconnected"),
            LifecycleEvent::Close => info!("Transport connection closed"),
            LifecycleEvent::Offline => warn!("Transport offline"),
            LifecycleEvent::End => info!("Transport session ended"),
        }
    }
}
