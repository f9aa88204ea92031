//! Route table construction with nested grouping
//!
//! A `Router` is an explicitly constructed value: build it, hand it to a
//! server with `apply_router`, and it is consumed. There is no process-wide
//! default router.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::method::Method;
use crate::path::normalize;
use crate::topic;

/// A registered route: controller plus its effective middleware chain.
pub struct Route {
    /// HTTP method the route answers.
    pub method: Method,
    /// Normalized path the route answers.
    pub path: String,
    pub(crate) controller: Arc<dyn Handler>,
    pub(crate) middlewares: Vec<Arc<dyn Handler>>,
}

impl Route {
    /// The effective middleware chain, outermost first.
    #[must_use]
    pub fn middlewares(&self) -> &[Arc<dyn Handler>] {
        &self.middlewares
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Accumulates routes, supporting nested groups with prefix and middleware
/// composition.
#[derive(Default)]
pub struct Router {
    prefix: String,
    middlewares: Vec<Arc<dyn Handler>>,
    routes: HashMap<String, Arc<Route>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.prefix)
            .field("middlewares", &self.middlewares.len())
            .field("routes", &self.routes.len())
            .finish()
    }
}

impl Router {
    /// Creates a router with no prefix and no middlewares.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a router whose routes all live under a normalized prefix.
    #[must_use]
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            prefix: normalize(prefix),
            ..Self::default()
        }
    }

    /// Appends a router-level middleware.
    ///
    /// Applies to routes registered afterwards, ahead of their call-site
    /// middlewares.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Handler>) {
        self.middlewares.push(middleware);
    }

    /// Registers a route.
    ///
    /// The stored middleware chain is the router's accumulated middlewares
    /// followed by `middlewares`, in registration order.
    ///
    /// # Errors
    /// Returns `Error::DuplicateRoute` if the (method, path) pair is already
    /// registered; the table is left unchanged.
    pub fn route(
        &mut self,
        method: Method,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        let path = normalize(&format!("{}{}", self.prefix, path));
        let key = topic::request_topic(method, &path);
        if self.routes.contains_key(&key) {
            return Err(Error::DuplicateRoute { topic: key });
        }

        let mut chain = self.middlewares.clone();
        chain.extend(middlewares);
        self.routes.insert(
            key,
            Arc::new(Route {
                method,
                path,
                controller: Arc::new(controller),
                middlewares: chain,
            }),
        );
        Ok(())
    }

    /// Registers a GET route.
    ///
    /// # Errors
    /// Same as [`Router::route`].
    pub fn get(
        &mut self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Get, path, controller, middlewares)
    }

    /// Registers a POST route.
    ///
    /// # Errors
    /// Same as [`Router::route`].
    pub fn post(
        &mut self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Post, path, controller, middlewares)
    }

    /// Registers a PUT route.
    ///
    /// # Errors
    /// Same as [`Router::route`].
    pub fn put(
        &mut self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Put, path, controller, middlewares)
    }

    /// Registers a PATCH route.
    ///
    /// # Errors
    /// Same as [`Router::route`].
    pub fn patch(
        &mut self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Patch, path, controller, middlewares)
    }

    /// Registers a DELETE route.
    ///
    /// # Errors
    /// Same as [`Router::route`].
    pub fn delete(
        &mut self,
        path: &str,
        controller: impl Handler,
        middlewares: Vec<Arc<dyn Handler>>,
    ) -> Result<()> {
        self.route(Method::Delete, path, controller, middlewares)
    }

    /// Builds a nested group of routes.
    ///
    /// The child router's prefix is `normalize(parent prefix + prefix)` and
    /// its middleware list is the parent's followed by `middlewares`, so a
    /// route at depth N inherits every ancestor list outer-to-inner. The
    /// builder runs synchronously; the child's routes merge into this router
    /// when it returns.
    ///
    /// # Errors
    /// Returns the builder's error, or `Error::DuplicateRoute` if a merged
    /// topic key collides with an existing one.
    pub fn group<F>(
        &mut self,
        prefix: &str,
        middlewares: Vec<Arc<dyn Handler>>,
        build: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut Router) -> Result<()>,
    {
        let mut chain = self.middlewares.clone();
        chain.extend(middlewares);
        let mut child = Router {
            prefix: normalize(&format!("{}{}", self.prefix, prefix)),
            middlewares: chain,
            routes: HashMap::new(),
        };
        build(&mut child)?;
        self.merge(child)
    }

    /// Merges another router's routes into this one.
    ///
    /// # Errors
    /// Returns `Error::DuplicateRoute` on the first colliding topic key; no
    /// routes are merged in that case.
    pub fn merge(&mut self, other: Router) -> Result<()> {
        for key in other.routes.keys() {
            if self.routes.contains_key(key) {
                return Err(Error::DuplicateRoute { topic: key.clone() });
            }
        }
        self.routes.extend(other.routes);
        Ok(())
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the router has no routes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Looks a route up by its topic key.
    #[must_use]
    pub fn get_route(&self, topic_key: &str) -> Option<&Arc<Route>> {
        self.routes.get(topic_key)
    }

    /// Consumes the router, yielding its table.
    #[must_use]
    pub(crate) fn into_routes(self) -> HashMap<String, Arc<Route>> {
        self.routes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handler::middleware;
    use crate::request::Request;
    use crate::response::Response;

    fn noop_controller() -> impl Handler {
        |_req: Request, _res: Response| async move { Ok(()) }
    }

    fn noop_middleware() -> Arc<dyn Handler> {
        middleware(|_req: Request, _res: Response| async move { Ok(()) })
    }

    #[test]
    fn test_duplicate_route_rejected_table_unchanged() {
        let mut router = Router::new();
        router.get("/x", noop_controller(), Vec::new()).unwrap();

        let err = router.get("/x", noop_controller(), Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateRoute { ref topic } if topic == "SERVER/GET/x/"
        ));
        assert_eq!(router.len(), 1);
        assert!(router.get_route("SERVER/GET/x/").is_some());
    }

    #[test]
    fn test_same_path_different_methods_coexist() {
        let mut router = Router::new();
        router.get("/x", noop_controller(), Vec::new()).unwrap();
        router.post("/x", noop_controller(), Vec::new()).unwrap();
        assert_eq!(router.len(), 2);
    }

    #[test]
    fn test_nested_group_prefix_composition() {
        let mut router = Router::with_prefix("/api/");
        router
            .group("/nested/", Vec::new(), |nested| {
                nested.post("/", noop_controller(), Vec::new())
            })
            .unwrap();

        let route = router.get_route("SERVER/POST/api/nested/").unwrap();
        assert_eq!(route.path, "/api/nested/");
        assert_eq!(route.method, Method::Post);
    }

    #[test]
    fn test_middleware_order_outer_to_inner() {
        let a = noop_middleware();
        let b = noop_middleware();
        let c = noop_middleware();

        let mut router = Router::new();
        router.use_middleware(a.clone());
        router
            .group("/g/", vec![b.clone()], |group| {
                group.get("/leaf", noop_controller(), vec![c.clone()])
            })
            .unwrap();

        let route = router.get_route("SERVER/GET/g/leaf/").unwrap();
        let chain = route.middlewares();
        assert_eq!(chain.len(), 3);
        assert!(Arc::ptr_eq(&chain[0], &a));
        assert!(Arc::ptr_eq(&chain[1], &b));
        assert!(Arc::ptr_eq(&chain[2], &c));
    }

    #[test]
    fn test_merge_collision_fails_without_overwrite() {
        let mut parent = Router::new();
        parent.get("/x", noop_controller(), Vec::new()).unwrap();
        let parent_route = parent.get_route("SERVER/GET/x/").unwrap().clone();

        let mut child = Router::new();
        child.get("/x", noop_controller(), Vec::new()).unwrap();
        child.get("/y", noop_controller(), Vec::new()).unwrap();

        assert!(matches!(
            parent.merge(child),
            Err(Error::DuplicateRoute { .. })
        ));
        // Nothing merged, original route untouched.
        assert_eq!(parent.len(), 1);
        assert!(Arc::ptr_eq(
            parent.get_route("SERVER/GET/x/").unwrap(),
            &parent_route
        ));
    }

    #[test]
    fn test_unbounded_nesting_accumulates_prefixes() {
        let mut router = Router::new();
        router
            .group("/a/", Vec::new(), |a| {
                a.group("/b/", Vec::new(), |b| {
                    b.group("/c/", Vec::new(), |c| {
                        c.delete("/leaf", noop_controller(), Vec::new())
                    })
                })
            })
            .unwrap();

        assert!(router.get_route("SERVER/DELETE/a/b/c/leaf/").is_some());
    }
}
