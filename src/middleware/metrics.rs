use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::dispatcher::{Handler, Request, Response};

/// Request counters in Prometheus text form
///
/// Register it as middleware to count dispatched requests, and hand it to
/// [`App::with_metrics`](crate::app::App::with_metrics) so the server shell
/// can record status and latency once each exchange is answered. All
/// counters are lock-free atomics.
#[derive(Debug, Default)]
pub struct RequestMetrics {
    request_count: AtomicUsize,
    completed: AtomicUsize,
    total_latency_ns: AtomicU64,
    status_2xx: AtomicUsize,
    status_3xx: AtomicUsize,
    status_4xx: AtomicUsize,
    status_5xx: AtomicUsize,
    unanswered: AtomicUsize,
}

impl RequestMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes through the middleware layer (a redirect adds one)
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Exchanges the server shell finished writing
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Exchanges no entry answered
    pub fn unanswered_count(&self) -> usize {
        self.unanswered.load(Ordering::Relaxed)
    }

    /// Mean time from dispatch start to response, zero before the first one
    pub fn average_latency(&self) -> Duration {
        let count = u64::try_from(self.completed.load(Ordering::Relaxed)).unwrap_or(u64::MAX);
        if count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    /// Count of completed exchanges in one status class (2 for 2xx, ...)
    pub fn status_class_count(&self, class: u16) -> usize {
        match class {
            2 => self.status_2xx.load(Ordering::Relaxed),
            3 => self.status_3xx.load(Ordering::Relaxed),
            4 => self.status_4xx.load(Ordering::Relaxed),
            5 => self.status_5xx.load(Ordering::Relaxed),
            _ => 0,
        }
    }

    /// Record a finished exchange
    pub fn observe(&self, status: u16, latency: Duration, answered: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX), Ordering::Relaxed);
        if !answered {
            self.unanswered.fetch_add(1, Ordering::Relaxed);
        }
        let bucket = match status / 100 {
            2 => &self.status_2xx,
            3 => &self.status_3xx,
            4 => &self.status_4xx,
            5 => &self.status_5xx,
            _ => return,
        };
        bucket.fetch_add(1, Ordering::Relaxed);
    }

    /// Prometheus exposition text
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "# HELP strata_requests_total Dispatch passes through the middleware layer\n\
             # TYPE strata_requests_total counter\n\
             strata_requests_total {}\n\
             # HELP strata_responses_total Responses written, by status class\n\
             # TYPE strata_responses_total counter\n\
             strata_responses_total{{class=\"2xx\"}} {}\n\
             strata_responses_total{{class=\"3xx\"}} {}\n\
             strata_responses_total{{class=\"4xx\"}} {}\n\
             strata_responses_total{{class=\"5xx\"}} {}\n\
             # HELP strata_unanswered_total Requests no entry answered\n\
             # TYPE strata_unanswered_total counter\n\
             strata_unanswered_total {}\n\
             # HELP strata_request_latency_seconds Average request latency in seconds\n\
             # TYPE strata_request_latency_seconds gauge\n\
             strata_request_latency_seconds {}\n",
            self.request_count(),
            self.status_class_count(2),
            self.status_class_count(3),
            self.status_class_count(4),
            self.status_class_count(5),
            self.unanswered_count(),
            self.average_latency().as_secs_f64(),
        )
    }
}

impl Handler for RequestMetrics {
    fn handle(&self, _req: &mut Request, _res: &mut Response) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }
}
