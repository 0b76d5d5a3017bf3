use http::Method;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::matcher::{normalize_path, PathPattern};
use crate::dispatcher::Handler;
use crate::error::RouterError;

/// Which request methods a [`RouteEntry`] accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    /// `*`: every method
    Any,
    /// Exactly one method
    Exact(Method),
}

impl MethodFilter {
    #[inline]
    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Exact(m) => m == method,
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        MethodFilter::Exact(method)
    }
}

impl FromStr for MethodFilter {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(MethodFilter::Any);
        }
        Method::from_bytes(s.to_ascii_uppercase().as_bytes())
            .map(MethodFilter::Exact)
            .map_err(|_| RouterError::InvalidMethod {
                method: s.to_string(),
            })
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Any => f.write_str("*"),
            MethodFilter::Exact(m) => write!(f, "{m}"),
        }
    }
}

/// One registered binding of method filter, path pattern and action
///
/// Entries are built by the registration API and only change when a router is
/// mounted, which rewrites the root once and recompiles the pattern.
#[derive(Clone)]
pub struct RouteEntry {
    method: MethodFilter,
    root: String,
    context: String,
    pattern: PathPattern,
    action: Arc<dyn Handler>,
}

impl RouteEntry {
    /// Create an entry rooted at `/`
    pub fn new(method: MethodFilter, context: &str, action: Arc<dyn Handler>) -> Self {
        Self {
            method,
            root: "/".to_string(),
            context: context.to_string(),
            pattern: PathPattern::compile(context),
            action,
        }
    }

    /// Move this entry under `prefix`
    ///
    /// Mounting composes: an entry already rooted at `/v1` and mounted at `/api`
    /// ends up under `/api/v1`.
    #[must_use]
    pub fn with_root(mut self, prefix: &str) -> Self {
        let root = if self.root == "/" {
            normalize_path(prefix)
        } else {
            normalize_path(&format!("{}/{}", prefix, self.root))
        };
        self.pattern = PathPattern::compile_rooted(&root, &self.context);
        self.root = root;
        self
    }

    #[inline]
    #[must_use]
    pub fn method(&self) -> &MethodFilter {
        &self.method
    }

    /// Mount root this entry lives under (`/` when never mounted)
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// The pattern as registered, before the root was applied
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[inline]
    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    #[inline]
    pub(crate) fn action(&self) -> &Arc<dyn Handler> {
        &self.action
    }
}

impl fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteEntry")
            .field("method", &self.method)
            .field("root", &self.root)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{Request, Response};

    fn noop() -> Arc<dyn Handler> {
        Arc::new(|_: &mut Request, _: &mut Response| {})
    }

    #[test]
    fn test_method_filter_parse() {
        assert_eq!("*".parse::<MethodFilter>().unwrap(), MethodFilter::Any);
        assert_eq!(
            "post".parse::<MethodFilter>().unwrap(),
            MethodFilter::Exact(Method::POST)
        );
        assert!(matches!(
            "GE T".parse::<MethodFilter>(),
            Err(RouterError::InvalidMethod { .. })
        ));
    }

    #[test]
    fn test_method_filter_accepts() {
        assert!(MethodFilter::Any.accepts(&Method::DELETE));
        assert!(MethodFilter::from(Method::GET).accepts(&Method::GET));
        assert!(!MethodFilter::from(Method::GET).accepts(&Method::POST));
    }

    #[test]
    fn test_with_root_composes() {
        let entry = RouteEntry::new(MethodFilter::Any, "/users/:id", noop())
            .with_root("/v1")
            .with_root("/api");
        assert_eq!(entry.root(), "/api/v1");
        assert_eq!(entry.pattern().as_str(), "/api/v1/users/:id");
        assert_eq!(entry.context(), "/users/:id");
    }
}
