//! # Dispatcher Module
//!
//! Runs an exchange through the layered filter chain.
//!
//! ## Overview
//!
//! - [`Request`] / [`Response`]: the mutable exchange handed to every entry
//! - [`FilterLayer`]: one ordered list of route entries
//! - [`FilterLayerHandler`]: N layers walked in order, layer 0 (middleware)
//!   before layer 1 (route handlers)
//! - [`Handler`]: the action trait shared by middleware and handlers
//! - [`Authorization`]: the parsed `Authorization` header
//!
//! ## Dispatch rules
//!
//! For each entry whose method filter accepts the request:
//!
//! 1. A universal `*` pattern runs the action straight away.
//! 2. Otherwise the path is matched; on success the request's params are
//!    replaced, parameter listeners fire, then the action runs.
//! 3. After the action, a closed response ends dispatch. A pending redirect
//!    restarts dispatch from layer 0 with the new path.

mod authorization;
mod core;
mod layer;
mod request;
mod response;

pub use core::{
    FilterLayerHandler, Handler, DEFAULT_MAX_REDIRECTS, HANDLER_LAYER, MIDDLEWARE_LAYER,
    STANDARD_LAYERS,
};
pub use authorization::Authorization;
pub use layer::FilterLayer;
pub use request::{Body, HeaderVec, Request, MAX_INLINE_HEADERS};
pub use response::{status_reason, Response};
