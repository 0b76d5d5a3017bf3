//! # Strata
//!
//! **Strata** is a request routing and middleware dispatch engine for
//! threaded HTTP services.
//!
//! ## Overview
//!
//! Every exchange walks an ordered stack of *filter layers*: first the
//! middleware layer, then the route handler layer. Within a layer, entries
//! run in registration order. Each entry matches on method and path pattern,
//! and either closes the response (ending dispatch), lets dispatch continue,
//! or asks for the request to be re-dispatched against another path.
//!
//! ## Architecture
//!
//! - **[`router`]** - Path patterns (`/users/:id`, `/static/*`, `*`), route
//!   entries, and the [`Router`] used to group and mount them
//! - **[`dispatcher`]** - The layered [`FilterLayerHandler`], the
//!   [`Handler`] trait and the [`Request`] / [`Response`] exchange types
//! - **[`worker`]** - Background tasks run on their own thread for the
//!   lifetime of the server
//! - **[`session`]** - In-memory sessions behind a cookie, swept by a
//!   background task
//! - **[`multipart`]** - Streaming `multipart/form-data` decoder
//! - **[`middleware`]** - CORS, request logging, metrics and static files
//! - **[`server`]** - `tiny_http` shell that feeds requests to the dispatcher
//! - **[`config`]** / **[`logging`]** - TOML + environment configuration and
//!   `tracing` setup
//!
//! ## Dispatch
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as server::AppService
//!     participant FLH as FilterLayerHandler
//!     participant MW as Layer 0 (middleware)
//!     participant H as Layer 1 (handlers)
//!
//!     Client->>Server: HTTP request
//!     Server->>FLH: handle(req, res)
//!     FLH->>MW: matching entries, in order
//!     MW-->>FLH: open / closed / redirect
//!     FLH->>H: matching entries, in order
//!     H-->>FLH: closed
//!     FLH-->>Server: Ok / RedirectLimit
//!     Server-->>Client: response (404 if nobody answered)
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use strata::session::CookieSession;
//! use strata::{App, Request, Response, Router};
//!
//! let mut api = Router::new();
//! api.get("/users/:id", |req: &mut Request, res: &mut Response| {
//!     let id = req.param("id").unwrap_or_default().to_string();
//!     res.json(&serde_json::json!({ "id": id }));
//! });
//!
//! let mut app = App::new();
//! app.use_worker(Arc::new(CookieSession::new("sid", Duration::from_secs(3600))));
//! app.mount("/api", api);
//!
//! let server = app.listen_on("127.0.0.1:8080").unwrap();
//! server.wait_ready().unwrap();
//! ```

pub mod app;
pub mod config;
pub mod cookie;
pub mod dispatcher;
pub mod error;
pub mod extensions;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod multipart;
pub mod router;
pub mod server;
pub mod session;
pub mod worker;

pub use app::App;
pub use config::AppConfig;
pub use dispatcher::{FilterLayerHandler, Handler, Request, Response};
pub use error::{ConfigError, RouterError};
pub use router::{MethodFilter, RouteEntry, Router};
pub use server::ServerHandle;
pub use worker::{BackgroundTask, BackgroundWorker};
