//! HTTP shell around the dispatcher
//!
//! Wire parsing is left to `tiny_http`; this module converts requests in and
//! responses out, and turns dispatch outcomes into status codes.

mod http_server;
mod request;
mod response;
mod service;

pub use http_server::{HttpServer, ServerHandle, ShutdownTrigger};
pub use request::{convert_request, IntakeError, LimitedBody};
pub use response::{into_wire, json_error, write_json_error};
pub use service::AppService;
