use http::Method;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dispatcher::{Handler, Request, Response};

/// CORS configuration error
///
/// Returned by [`CorsOptions::build`] when the configuration violates the
/// CORS specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsConfigError {
    /// Wildcard origin (`*`) cannot be used with credentials
    WildcardWithCredentials,
    /// Origin is not of the form `scheme://host[:port]`
    InvalidOriginFormat {
        /// The invalid origin string
        origin: String,
    },
}

impl fmt::Display for CorsConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorsConfigError::WildcardWithCredentials => write!(
                f,
                "CORS configuration error: Cannot use wildcard origin (*) with credentials"
            ),
            CorsConfigError::InvalidOriginFormat { origin } => write!(
                f,
                "CORS configuration error: Invalid origin format '{}'. \
                 Expected format: scheme://host:port (e.g., https://example.com)",
                origin
            ),
        }
    }
}

impl std::error::Error for CorsConfigError {}

type RequestFilter = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Builder for [`Cors`]
///
/// Defaults: every origin (`*`), methods `GET, POST, PUT, DELETE, PATCH,
/// OPTIONS`, headers `Content-Type, Authorization`, no credentials, no
/// preflight caching.
#[derive(Clone)]
pub struct CorsOptions {
    origins: Vec<String>,
    methods: Vec<Method>,
    headers: Vec<String>,
    expose_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Option<u32>,
    filter: Option<RequestFilter>,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origins: vec!["*".to_string()],
            methods: vec![
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::PATCH,
                Method::OPTIONS,
            ],
            headers: vec!["Content-Type".into(), "Authorization".into()],
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age: None,
            filter: None,
        }
    }
}

impl CorsOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact origins to allow, or `&["*"]` for any
    #[must_use]
    pub fn origins(mut self, origins: &[&str]) -> Self {
        self.origins = origins.iter().map(|o| o.trim_end_matches('/').to_string()).collect();
        self
    }

    #[must_use]
    pub fn methods(mut self, methods: &[Method]) -> Self {
        self.methods = methods.to_vec();
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: &[&str]) -> Self {
        self.headers = headers.iter().map(|h| h.to_string()).collect();
        self
    }

    #[must_use]
    pub fn expose_headers(mut self, headers: &[&str]) -> Self {
        self.expose_headers = headers.iter().map(|h| h.to_string()).collect();
        self
    }

    #[must_use]
    pub fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// Preflight cache lifetime in seconds
    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// Only apply CORS to requests for which `filter` returns true
    #[must_use]
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Validate and build the middleware
    ///
    /// # Errors
    ///
    /// See [`CorsConfigError`].
    pub fn build(self) -> Result<Cors, CorsConfigError> {
        let wildcard = self.origins.iter().any(|o| o == "*");
        if wildcard && self.allow_credentials {
            return Err(CorsConfigError::WildcardWithCredentials);
        }
        if let Some(bad) = self.origins.iter().find(|o| {
            o.as_str() != "*" && !(o.starts_with("http://") || o.starts_with("https://"))
        }) {
            return Err(CorsConfigError::InvalidOriginFormat { origin: bad.clone() });
        }

        let join = |items: &[String]| items.join(", ");
        Ok(Cors {
            wildcard,
            allow_methods: self
                .methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", "),
            allow_headers: join(&self.headers),
            expose_headers: join(&self.expose_headers),
            options: self,
        })
    }
}

impl fmt::Debug for CorsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorsOptions")
            .field("origins", &self.origins)
            .field("methods", &self.methods)
            .field("headers", &self.headers)
            .field("allow_credentials", &self.allow_credentials)
            .field("max_age", &self.max_age)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// Cross-origin resource sharing middleware
///
/// Register it ahead of the routes it should cover. For ordinary requests
/// it adds the `Access-Control-Allow-*` headers and lets dispatch continue;
/// a preflight (`OPTIONS` with `Access-Control-Request-Method`) is answered
/// directly with `204`. Requests from an origin that is not allowed get `403`.
#[derive(Debug)]
pub struct Cors {
    options: CorsOptions,
    wildcard: bool,
    allow_methods: String,
    allow_headers: String,
    expose_headers: String,
}

impl Cors {
    /// Allow every origin with the default methods and headers
    #[must_use]
    pub fn permissive() -> Self {
        Cors {
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
            expose_headers: String::new(),
            wildcard: true,
            options: CorsOptions::default(),
        }
    }

    fn allowed_origin(&self, origin: &str) -> Option<String> {
        if self.wildcard {
            return Some("*".to_string());
        }
        let origin = origin.trim_end_matches('/');
        self.options
            .origins
            .iter()
            .find(|o| o.eq_ignore_ascii_case(origin))
            .map(|_| origin.to_string())
    }

    fn apply_headers(&self, res: &mut Response, origin: &str) {
        res.set_header("Access-Control-Allow-Origin", origin);
        res.set_header("Access-Control-Allow-Methods", self.allow_methods.as_str());
        res.set_header("Access-Control-Allow-Headers", self.allow_headers.as_str());
        if self.options.allow_credentials {
            res.set_header("Access-Control-Allow-Credentials", "true");
        }
        if !self.expose_headers.is_empty() {
            res.set_header("Access-Control-Expose-Headers", self.expose_headers.as_str());
        }
        if !self.wildcard {
            res.set_header("Vary", "Origin");
        }
    }
}

impl Handler for Cors {
    fn handle(&self, req: &mut Request, res: &mut Response) {
        if let Some(filter) = &self.options.filter {
            if !filter(req) {
                return;
            }
        }

        let Some(origin) = req.header("origin") else {
            // Not a cross-origin request
            return;
        };

        let Some(allowed) = self.allowed_origin(origin) else {
            warn!(request_id = %req.request_id(), origin, "CORS: origin not allowed");
            res.send_status(403);
            return;
        };

        self.apply_headers(res, &allowed);

        let preflight = req.method() == Method::OPTIONS
            && req.header("access-control-request-method").is_some();
        if preflight {
            if let Some(max_age) = self.options.max_age {
                res.set_header("Access-Control-Max-Age", max_age.to_string());
            }
            debug!(request_id = %req.request_id(), origin = %allowed, "CORS preflight answered");
            res.set_status(204).end();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(cors: &Cors, req: Request) -> Response {
        let mut req = req;
        let mut res = Response::new();
        cors.handle(&mut req, &mut res);
        res
    }

    #[test]
    fn test_wildcard_with_credentials_rejected() {
        let err = CorsOptions::new().allow_credentials(true).build().unwrap_err();
        assert_eq!(err, CorsConfigError::WildcardWithCredentials);

        let err = CorsOptions::new().origins(&["example.com"]).build().unwrap_err();
        assert!(matches!(err, CorsConfigError::InvalidOriginFormat { .. }));
    }

    #[test]
    fn test_permissive_sets_headers_and_continues() {
        let res = run(
            &Cors::permissive(),
            Request::new(Method::GET, "/").with_header("Origin", "https://a.test"),
        );
        assert!(!res.is_closed());
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert!(res.header("access-control-allow-methods").unwrap().contains("PATCH"));
        assert!(res.header("vary").is_none());
    }

    #[test]
    fn test_exact_origin_echoed() {
        let cors = CorsOptions::new()
            .origins(&["https://app.test"])
            .allow_credentials(true)
            .expose_headers(&["X-Total"])
            .build()
            .unwrap();
        let res = run(&cors, Request::new(Method::GET, "/").with_header("Origin", "https://app.test"));
        assert_eq!(res.header("access-control-allow-origin"), Some("https://app.test"));
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
        assert_eq!(res.header("access-control-expose-headers"), Some("X-Total"));
        assert_eq!(res.header("vary"), Some("Origin"));

        let res = run(&cors, Request::new(Method::GET, "/").with_header("Origin", "https://evil.test"));
        assert!(res.is_closed());
        assert_eq!(res.status(), 403);
    }

    #[test]
    fn test_preflight_answered() {
        let cors = CorsOptions::new().max_age(600).build().unwrap();
        let res = run(
            &cors,
            Request::new(Method::OPTIONS, "/items")
                .with_header("Origin", "https://a.test")
                .with_header("Access-Control-Request-Method", "POST"),
        );
        assert!(res.is_closed());
        assert_eq!(res.status(), 204);
        assert_eq!(res.header("access-control-max-age"), Some("600"));
    }

    #[test]
    fn test_filter_skips_requests() {
        let cors = CorsOptions::new()
            .filter(|req: &Request| req.path().starts_with("/api"))
            .build()
            .unwrap();
        let res = run(&cors, Request::new(Method::GET, "/site").with_header("Origin", "https://a.test"));
        assert!(res.header("access-control-allow-origin").is_none());
        let res = run(&cors, Request::new(Method::GET, "/api/x").with_header("Origin", "https://a.test"));
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_no_origin_untouched() {
        let res = run(&Cors::permissive(), Request::new(Method::GET, "/"));
        assert!(res.headers().is_empty());
    }
}
