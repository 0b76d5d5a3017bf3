use std::io;
use std::net::ToSocketAddrs;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::AppConfig;
use crate::dispatcher::{Handler, Request, Response};
use crate::middleware::RequestMetrics;
use crate::router::Router;
use crate::server::{AppService, HttpServer, ServerHandle};
use crate::worker::WorkerGroup;

/// The application: a root [`Router`] plus everything needed to serve it
///
/// Registration methods come from the router (`app.get(..)`,
/// `app.use_middleware(..)`, `app.mount(..)`) through `Deref`. Once
/// registration is done, [`listen`](Self::listen) freezes the routing table,
/// starts the background workers and then the server threads.
///
/// ```rust,no_run
/// use strata::{App, Request, Response};
///
/// let mut app = App::new();
/// app.get("/hello/:name", |req: &mut Request, res: &mut Response| {
///     let name = req.param("name").unwrap_or("world").to_string();
///     res.send(format!("hello {name}"));
/// });
/// let server = app.listen_on("127.0.0.1:0").unwrap();
/// server.stop();
/// ```
#[derive(Default)]
pub struct App {
    router: Router,
    param_listeners: Vec<(String, Arc<dyn Handler>)>,
    config: AppConfig,
    metrics: Option<Arc<RequestMetrics>>,
}

impl App {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run `handler` whenever a matched route binds parameter `name`
    ///
    /// Listeners run before the route's own handler and may close the
    /// response to stop it from running.
    pub fn param<H: Handler + 'static>(&mut self, name: &str, handler: H) -> &mut Self {
        info!(param = name, "Parameter listener registered");
        self.param_listeners
            .push((name.to_string(), Arc::new(handler)));
        self
    }

    /// Count requests with `metrics` and record status and latency per exchange
    ///
    /// The counting middleware is registered at this point in the middleware
    /// order.
    pub fn with_metrics(&mut self, metrics: Arc<RequestMetrics>) -> &mut Self {
        let counter = Arc::clone(&metrics);
        self.router
            .use_middleware(move |req: &mut Request, res: &mut Response| counter.handle(req, res));
        self.metrics = Some(metrics);
        self
    }

    /// Freeze registration into a service and the workers to run with it
    #[must_use]
    pub fn into_service(self) -> (AppService, WorkerGroup) {
        let (handler, workers) = self.router.into_parts();
        let mut handler = handler.with_max_redirects(self.config.max_redirects);
        for (name, listener) in self.param_listeners {
            handler.set_param_listener(&name, listener);
        }
        let service = AppService::new(Arc::new(handler), self.config.max_body_size)
            .with_metrics(self.metrics);
        (service, workers)
    }

    /// Serve on the configured `bind_address`
    ///
    /// # Errors
    ///
    /// See [`listen_on`](Self::listen_on).
    pub fn listen(self) -> io::Result<ServerHandle> {
        let addr = self.config.bind_address.clone();
        self.listen_on(addr.as_str())
    }

    /// Start the background workers, then serve on `addr`
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread can't be spawned or the address
    /// can't be bound. Workers already started are stopped again.
    pub fn listen_on<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let threads = self.config.worker_threads;
        let (service, workers) = self.into_service();

        workers.start_all()?;
        match HttpServer::new(service, threads).start(addr) {
            Ok(handle) => Ok(handle.with_workers(workers)),
            Err(e) => {
                error!(error = %e, "Failed to start server");
                workers.stop_all();
                Err(e)
            }
        }
    }
}

impl Deref for App {
    type Target = Router;

    fn deref(&self) -> &Router {
        &self.router
    }
}

impl DerefMut for App {
    fn deref_mut(&mut self) -> &mut Router {
        &mut self.router
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("router", &self.router)
            .field(
                "param_listeners",
                &self.param_listeners.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}
