use tracing::{debug, info};

use crate::dispatcher::{Handler, Request, Response};

/// Logs every request as it enters the middleware layer
///
/// Completion (status and latency) is logged by the server shell once the
/// response is written; this middleware covers the arrival side, including
/// exchanges that never reach a handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger {
    verbose: bool,
}

impl RequestLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log headers at debug level
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Handler for RequestLogger {
    fn handle(&self, req: &mut Request, _res: &mut Response) {
        info!(
            request_id = %req.request_id(),
            method = %req.method(),
            path = %req.path(),
            remote = ?req.remote_addr(),
            "Request received"
        );
        if self.verbose {
            for (name, value) in req.headers() {
                debug!(request_id = %req.request_id(), header = %name, value = %value, "Request header");
            }
        }
    }
}
