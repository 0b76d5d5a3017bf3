//! # Router Module
//!
//! Path patterns, route entries and the [`Router`] registration builder.
//!
//! ## Overview
//!
//! - [`PathPattern`]: compiles `/user/:id/*` style patterns once and matches
//!   request paths with a single forward scan
//! - [`RouteEntry`]: a method filter, pattern and action bound together
//! - [`Router`]: collects middleware and route entries into two layers so a
//!   group of routes can be mounted under a prefix
//!
//! ## Pattern syntax
//!
//! | Pattern | Path | Result |
//! |---------|------|--------|
//! | `/user/:id` | `/user/42` | `{id: "42"}` |
//! | `/user/:id` | `/user/42/extra` | no match |
//! | `/files/*/raw` | `/files/a/raw` | match, nothing bound |
//! | `*` | anything | match without scanning |
//!
//! ## Performance
//!
//! Matching allocates only the decoded parameter values; parameter names are
//! `Arc<str>` shared with the compiled pattern and stored inline in a
//! [`ParamVec`] for up to eight parameters.

mod core;
mod entry;
mod matcher;
#[cfg(test)]
mod tests;

pub use core::Router;
pub use entry::{MethodFilter, RouteEntry};
pub use matcher::{normalize_path, ParamVec, PathPattern, MAX_INLINE_PARAMS};
