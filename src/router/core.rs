use http::Method;
use std::sync::Arc;
use tracing::info;

use super::entry::{MethodFilter, RouteEntry};
use crate::dispatcher::{FilterLayer, FilterLayerHandler, Handler};
use crate::worker::{BackgroundTask, BackgroundWorker, WorkerGroup};

/// A detachable group of middleware, route handlers and background workers
///
/// Build it with the registration methods, then hand it to
/// [`App::mount`](crate::app::App::mount) or [`Router::mount`] to place every
/// entry under a path prefix. Middleware registered here still runs before
/// every route handler of the parent once mounted.
///
/// ```rust
/// use strata::router::Router;
/// use strata::dispatcher::{Request, Response};
///
/// let mut users = Router::new();
/// users
///     .get("/", |_: &mut Request, res: &mut Response| res.send("all users"))
///     .get("/:id", |req: &mut Request, res: &mut Response| {
///         let id = req.param("id").unwrap_or_default().to_string();
///         res.send(id);
///     });
/// assert_eq!(users.route_count(), 2);
/// ```
#[derive(Default)]
pub struct Router {
    middleware: FilterLayer,
    handlers: FilterLayer,
    workers: WorkerGroup,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Middleware for every path and method
    pub fn use_middleware<H: Handler + 'static>(&mut self, handler: H) -> &mut Self {
        self.push_middleware(MethodFilter::Any, "*", Arc::new(handler))
    }

    /// Middleware for one path pattern, every method
    pub fn use_at<H: Handler + 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.push_middleware(MethodFilter::Any, path, Arc::new(handler))
    }

    /// Middleware for one path pattern and method filter
    pub fn use_for<H: Handler + 'static>(
        &mut self,
        path: &str,
        method: impl Into<MethodFilter>,
        handler: H,
    ) -> &mut Self {
        self.push_middleware(method.into(), path, Arc::new(handler))
    }

    /// Middleware that also owns a background task, for every path
    ///
    /// The task is started with the server and stopped with it.
    pub fn use_worker<T>(&mut self, middleware: Arc<T>) -> &mut Self
    where
        T: Handler + BackgroundTask + 'static,
    {
        self.use_worker_at("*", middleware)
    }

    /// Middleware that also owns a background task, for one path pattern
    pub fn use_worker_at<T>(&mut self, path: &str, middleware: Arc<T>) -> &mut Self
    where
        T: Handler + BackgroundTask + 'static,
    {
        let task: Arc<dyn BackgroundTask> = Arc::clone(&middleware) as Arc<dyn BackgroundTask>;
        self.workers.push(BackgroundWorker::new(task));
        self.push_middleware(MethodFilter::Any, path, middleware)
    }

    /// Handler for every path and method
    pub fn all<H: Handler + 'static>(&mut self, handler: H) -> &mut Self {
        self.push_route(MethodFilter::Any, "*", Arc::new(handler))
    }

    /// Handler for one path pattern, every method
    pub fn all_at<H: Handler + 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.push_route(MethodFilter::Any, path, Arc::new(handler))
    }

    /// Handler for one path pattern and method filter
    pub fn all_for<H: Handler + 'static>(
        &mut self,
        path: &str,
        method: impl Into<MethodFilter>,
        handler: H,
    ) -> &mut Self {
        self.push_route(method.into(), path, Arc::new(handler))
    }

    pub fn get<H: Handler + 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.push_route(Method::GET.into(), path, Arc::new(handler))
    }

    pub fn post<H: Handler + 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.push_route(Method::POST.into(), path, Arc::new(handler))
    }

    pub fn put<H: Handler + 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.push_route(Method::PUT.into(), path, Arc::new(handler))
    }

    pub fn delete<H: Handler + 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.push_route(Method::DELETE.into(), path, Arc::new(handler))
    }

    pub fn patch<H: Handler + 'static>(&mut self, path: &str, handler: H) -> &mut Self {
        self.push_route(Method::PATCH.into(), path, Arc::new(handler))
    }

    /// Place every entry of `other` under `path` and merge it in
    ///
    /// Roots compose, so mounting a router that itself mounted a child keeps
    /// the child's prefix below `path`. Background workers move along.
    pub fn mount(&mut self, path: &str, other: Router) -> &mut Self {
        info!(
            root = %path,
            middleware = other.middleware.len(),
            routes = other.handlers.len(),
            workers = other.workers.len(),
            "Router mounted"
        );
        self.middleware.append(other.middleware.rooted(path));
        self.handlers.append(other.handlers.rooted(path));
        self.workers.extend(other.workers);
        self
    }

    /// Merge `other` without changing its roots
    pub fn merge(&mut self, other: Router) -> &mut Self {
        self.middleware.append(other.middleware);
        self.handlers.append(other.handlers);
        self.workers.extend(other.workers);
        self
    }

    #[must_use]
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    #[must_use]
    pub fn route_count(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Entries in dispatch order: every middleware, then every handler
    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> + '_ {
        self.middleware
            .entries()
            .iter()
            .chain(self.handlers.entries())
    }

    /// Freeze into the two-layer handler plus the workers to run alongside it
    #[must_use]
    pub fn into_parts(self) -> (FilterLayerHandler, WorkerGroup) {
        (
            FilterLayerHandler::from_layers(vec![self.middleware, self.handlers]),
            self.workers,
        )
    }

    fn push_middleware(
        &mut self,
        method: MethodFilter,
        path: &str,
        action: Arc<dyn Handler>,
    ) -> &mut Self {
        let entry = RouteEntry::new(method, path, action);
        info!(method = %entry.method(), pattern = %entry.pattern(), "Middleware registered");
        self.middleware.push(entry);
        self
    }

    fn push_route(&mut self, method: MethodFilter, path: &str, action: Arc<dyn Handler>) -> &mut Self {
        let entry = RouteEntry::new(method, path, action);
        info!(method = %entry.method(), pattern = %entry.pattern(), "Route registered");
        self.handlers.push(entry);
        self
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("middleware", &self.middleware)
            .field("handlers", &self.handlers)
            .field("workers", &self.workers.len())
            .finish()
    }
}
