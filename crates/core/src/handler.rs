//! Middleware and controller abstraction
//!
//! Middlewares and controllers share one shape: an async function of the
//! request and its response handle. A middleware short-circuits the rest of
//! its chain by sending a response; the dispatcher checks
//! [`Response::has_been_sent`](crate::response::Response::has_been_sent)
//! after each middleware completes.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::request::Request;
use crate::response::Response;

/// A unit of request-processing logic.
///
/// Implemented automatically for async closures taking `(Request, Response)`:
///
/// ```ignore
/// let controller = |_req: Request, res: Response| async move {
///     res.ok(serde_json::json!({"message": "Hello World"})).await
/// };
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Processes a request. Errors are caught per-message by the dispatcher.
    async fn call(&self, request: Request, response: Response) -> Result<()>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn call(&self, request: Request, response: Response) -> Result<()> {
        self(request, response).await
    }
}

/// Wraps a handler into the shared form used in middleware lists.
pub fn middleware(handler: impl Handler) -> Arc<dyn Handler> {
    Arc::new(handler)
}
