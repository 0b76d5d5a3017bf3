//! Ready-made middleware
//!
//! Every type here implements [`Handler`](crate::dispatcher::Handler) and is
//! registered like any closure, e.g. `app.use_middleware(Cors::permissive())`.

mod cors;
mod form;
mod logger;
mod metrics;
mod static_files;

pub use cors::{Cors, CorsConfigError, CorsOptions};
pub use form::FormParser;
pub use logger::RequestLogger;
pub use metrics::RequestMetrics;
pub use static_files::{content_type_for, DotFiles, StaticFiles};
