//! Dispatcher core module - hot path for request dispatch.
//!
//! [`FilterLayerHandler::handle`] walks every layer in order and every entry
//! within a layer in order. Two things end a pass early:
//!
//! - the response closing, which ends dispatch entirely (only one responder
//!   per exchange)
//! - a redirect requested through [`Request::redirect`], which restarts the
//!   walk at layer 0 against the new path
//!
//! Redirects are handled by looping, not recursing, and the number of hops per
//! exchange is capped.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::layer::FilterLayer;
use super::request::Request;
use super::response::Response;
use crate::error::RouterError;
use crate::router::RouteEntry;

/// Index of the middleware layer in the standard two-layer setup
pub const MIDDLEWARE_LAYER: usize = 0;
/// Index of the route handler layer in the standard two-layer setup
pub const HANDLER_LAYER: usize = 1;
/// Layer count used by [`Router`](crate::router::Router) and [`App`](crate::app::App)
pub const STANDARD_LAYERS: usize = 2;
/// Redirect hops allowed per exchange unless configured otherwise
pub const DEFAULT_MAX_REDIRECTS: usize = 8;

/// Anything that can act on an exchange: middleware, route handlers and
/// parameter listeners all share this trait
///
/// Closures with the matching signature implement it directly.
pub trait Handler: Send + Sync {
    fn handle(&self, req: &mut Request, res: &mut Response);
}

impl<F> Handler for F
where
    F: Fn(&mut Request, &mut Response) + Send + Sync,
{
    fn handle(&self, req: &mut Request, res: &mut Response) {
        self(req, res)
    }
}

/// Owns N ordered filter layers and runs an exchange through them
///
/// Built during registration and shared read-only (`Arc`) once serving starts.
pub struct FilterLayerHandler {
    layers: Vec<FilterLayer>,
    param_listeners: HashMap<Arc<str>, Arc<dyn Handler>>,
    max_redirects: usize,
}

impl FilterLayerHandler {
    #[must_use]
    pub fn new(layer_count: usize) -> Self {
        Self {
            layers: (0..layer_count).map(|_| FilterLayer::new()).collect(),
            param_listeners: HashMap::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    /// Wrap already-populated layers
    #[must_use]
    pub fn from_layers(layers: Vec<FilterLayer>) -> Self {
        Self {
            layers,
            param_listeners: HashMap::new(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }

    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[must_use]
    pub fn layer(&self, index: usize) -> Option<&FilterLayer> {
        self.layers.get(index)
    }

    /// Append `entry` to layer `layer`
    ///
    /// # Errors
    ///
    /// `RouterError::InvalidLayer` when `layer` is out of range.
    pub fn add(&mut self, layer: usize, entry: RouteEntry) -> Result<(), RouterError> {
        let layer_count = self.layers.len();
        let target = self
            .layers
            .get_mut(layer)
            .ok_or(RouterError::InvalidLayer { layer, layer_count })?;
        debug!(
            layer,
            method = %entry.method(),
            pattern = %entry.pattern(),
            "Filter entry added"
        );
        target.push(entry);
        Ok(())
    }

    /// Merge `other` into this handler layer by layer
    ///
    /// Entries of `other` are appended after the existing entries of the same
    /// layer. Parameter listeners already registered here take precedence.
    ///
    /// # Errors
    ///
    /// `RouterError::LayerCountMismatch` when the layer counts differ.
    pub fn combine(&mut self, other: FilterLayerHandler) -> Result<(), RouterError> {
        if other.layers.len() != self.layers.len() {
            return Err(RouterError::LayerCountMismatch {
                expected: self.layers.len(),
                found: other.layers.len(),
            });
        }
        for (mine, theirs) in self.layers.iter_mut().zip(other.layers) {
            mine.append(theirs);
        }
        for (name, listener) in other.param_listeners {
            self.param_listeners.entry(name).or_insert(listener);
        }
        Ok(())
    }

    /// Run `listener` whenever a matched entry binds parameter `name`
    pub fn set_param_listener(&mut self, name: &str, listener: Arc<dyn Handler>) {
        self.param_listeners.insert(Arc::from(name), listener);
    }

    /// Dispatch one exchange
    ///
    /// Returns once the response is closed or every layer has been walked.
    /// An unmatched request is not an error: the response is simply left open
    /// for the caller to deal with.
    ///
    /// # Errors
    ///
    /// `RouterError::RedirectLimit` when the exchange redirects more than the
    /// configured number of times.
    pub fn handle(&self, req: &mut Request, res: &mut Response) -> Result<(), RouterError> {
        let mut hops = 0usize;

        'dispatch: loop {
            for (layer_idx, layer) in self.layers.iter().enumerate() {
                for entry in layer.entries() {
                    if !self.invoke(entry, req, res) {
                        continue;
                    }

                    if res.is_closed() {
                        debug!(
                            request_id = %req.request_id(),
                            layer = layer_idx,
                            pattern = %entry.pattern(),
                            status = res.status(),
                            "Response closed"
                        );
                        // A redirect queued alongside a close never runs
                        req.take_redirect();
                        return Ok(());
                    }

                    if let Some(target) = req.take_redirect() {
                        if hops >= self.max_redirects {
                            warn!(
                                request_id = %req.request_id(),
                                hops,
                                target = %target,
                                "Redirect limit reached"
                            );
                            return Err(RouterError::RedirectLimit { hops, path: target });
                        }
                        hops += 1;
                        debug!(
                            request_id = %req.request_id(),
                            from = %req.path(),
                            to = %target,
                            hops,
                            "Redirect, restarting dispatch"
                        );
                        req.set_path(target);
                        continue 'dispatch;
                    }
                }
            }
            return Ok(());
        }
    }

    /// Returns true when the entry's action (or a parameter listener) ran
    fn invoke(&self, entry: &RouteEntry, req: &mut Request, res: &mut Response) -> bool {
        if !entry.method().accepts(req.method()) {
            return false;
        }

        let pattern = entry.pattern();
        if pattern.is_universal() {
            if pattern.matches(req.path()).is_none() {
                return false;
            }
            req.set_context(entry.pattern().as_str());
            entry.action().handle(req, res);
            return true;
        }

        let Some(params) = pattern.matches(req.path()) else {
            return false;
        };
        req.set_params(params);

        if !self.param_listeners.is_empty() {
            self.fire_param_listeners(req, res);
            if res.is_closed() {
                return true;
            }
        }

        req.set_context(entry.pattern().as_str());
        entry.action().handle(req, res);
        true
    }

    fn fire_param_listeners(&self, req: &mut Request, res: &mut Response) {
        let listeners: Vec<Arc<dyn Handler>> = req
            .params()
            .iter()
            .filter_map(|(name, _)| self.param_listeners.get(name).map(Arc::clone))
            .collect();
        for listener in listeners {
            listener.handle(req, res);
            if res.is_closed() {
                return;
            }
        }
    }
}

impl std::fmt::Debug for FilterLayerHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterLayerHandler")
            .field("layers", &self.layers)
            .field("param_listeners", &self.param_listeners.keys().collect::<Vec<_>>())
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}
