use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::request::{attach_body, convert_request, IntakeError};
use super::response::{into_wire, json_error, write_json_error};
use crate::dispatcher::{Body, FilterLayerHandler, Request, Response};
use crate::error::RouterError;
use crate::middleware::RequestMetrics;

/// Bridges the socket layer and the dispatcher
///
/// Cloned into every server thread; all state behind it is shared and
/// read-only.
#[derive(Clone)]
pub struct AppService {
    handler: Arc<FilterLayerHandler>,
    metrics: Option<Arc<RequestMetrics>>,
    max_body_size: usize,
}

impl AppService {
    pub fn new(handler: Arc<FilterLayerHandler>, max_body_size: usize) -> Self {
        Self {
            handler,
            metrics: None,
            max_body_size,
        }
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<Arc<RequestMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn handler(&self) -> &Arc<FilterLayerHandler> {
        &self.handler
    }

    /// Run one request through the filter layers and settle the outcome
    ///
    /// A response nobody closed becomes a JSON `404`; exceeding the redirect
    /// limit becomes `508`.
    pub fn dispatch(&self, req: &mut Request) -> Response {
        self.dispatch_tracked(req).0
    }

    /// Like [`dispatch`](Self::dispatch), also reporting whether an entry
    /// closed the response
    fn dispatch_tracked(&self, req: &mut Request) -> (Response, bool) {
        let mut res = Response::new();
        let mut answered = true;
        match self.handler.handle(req, &mut res) {
            Ok(()) if res.is_closed() => {}
            Ok(()) => {
                answered = false;
                warn!(
                    request_id = %req.request_id(),
                    method = %req.method(),
                    path = %req.path(),
                    "No entry answered the request"
                );
                write_json_error(
                    &mut res,
                    404,
                    json!({ "error": "Not Found", "method": req.method().as_str(), "path": req.path() }),
                );
            }
            Err(err @ RouterError::RedirectLimit { .. }) => {
                res = json_error(508, json!({ "error": err.to_string() }));
            }
            Err(err) => {
                error!(request_id = %req.request_id(), error = %err, "Dispatch failed");
                res = json_error(500, json!({ "error": "Internal Server Error" }));
            }
        }
        (res, answered)
    }

    /// Handle one `tiny_http` request end to end
    ///
    /// The body is streamed from the connection while the filter layers run;
    /// the exchange is taken back to write the response once the body has
    /// been released.
    pub fn serve(&self, rq: tiny_http::Request) {
        let started = Instant::now();
        let url = rq.url().to_string();
        let intake = convert_request(&rq, self.max_body_size);
        let exchange = Arc::new(Mutex::new(rq));

        let (req, res, answered) = match intake {
            Ok(req) => {
                let mut req = attach_body(req, &exchange, self.max_body_size);
                let (res, answered) = self.dispatch_tracked(&mut req);
                *req.body_mut() = Body::empty();
                (Some(req), res, answered)
            }
            Err(IntakeError::TooLarge { limit }) => (
                None,
                json_error(413, json!({ "error": "Payload Too Large", "limit": limit })),
                true,
            ),
            Err(IntakeError::BadMethod(method)) => (
                None,
                json_error(405, json!({ "error": "Method Not Allowed", "method": method })),
                true,
            ),
        };

        let status = res.status();
        let latency = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.observe(status, latency, answered);
        }
        if let Some(req) = &req {
            info!(
                request_id = %req.request_id(),
                method = %req.method(),
                path = %req.original_path(),
                status,
                latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                "Request complete"
            );
        }

        match Arc::try_unwrap(exchange) {
            Ok(exchange) => {
                if let Err(e) = exchange.into_inner().respond(into_wire(res)) {
                    warn!(url = %url, error = %e, "Failed to write response");
                }
            }
            Err(_) => {
                error!(url = %url, status, "Request body still held after dispatch; response dropped");
            }
        }
    }
}

impl std::fmt::Debug for AppService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppService")
            .field("handler", &self.handler)
            .field("metrics", &self.metrics.is_some())
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::FilterLayer;
    use crate::router::{MethodFilter, RouteEntry};
    use http::Method;

    fn service(entries: Vec<RouteEntry>) -> AppService {
        let mut layer = FilterLayer::new();
        for e in entries {
            layer.push(e);
        }
        AppService::new(Arc::new(FilterLayerHandler::from_layers(vec![layer])), 1024)
    }

    #[test]
    fn test_unanswered_becomes_404() {
        let svc = service(vec![]);
        let mut req = Request::new(Method::GET, "/missing");
        let res = svc.dispatch(&mut req);
        assert_eq!(res.status(), 404);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["path"], "/missing");
    }

    #[test]
    fn test_open_headers_survive_404() {
        let svc = service(vec![RouteEntry::new(
            MethodFilter::Any,
            "*",
            Arc::new(|_: &mut Request, res: &mut Response| {
                res.set_header("X-Seen", "1");
            }),
        )]);
        let mut req = Request::new(Method::GET, "/x");
        let res = svc.dispatch(&mut req);
        assert_eq!(res.status(), 404);
        assert_eq!(res.header("x-seen"), Some("1"));
    }

    #[test]
    fn test_redirect_loop_becomes_508() {
        let svc = service(vec![RouteEntry::new(
            MethodFilter::Any,
            "*",
            Arc::new(|req: &mut Request, _: &mut Response| req.redirect("/again")),
        )]);
        let mut req = Request::new(Method::GET, "/");
        let res = svc.dispatch(&mut req);
        assert_eq!(res.status(), 508);
    }
}
