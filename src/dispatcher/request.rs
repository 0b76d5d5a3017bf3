use http::Method;
use smallvec::SmallVec;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;

use super::authorization::Authorization;
use crate::cookie::parse_cookie_header;
use crate::extensions::{ExtensionKey, Extensions};
use crate::ids::RequestId;
use crate::router::{normalize_path, ParamVec};

/// Maximum inline headers/cookies before heap allocation
/// Most requests have ≤16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header/cookie storage for the hot path
///
/// Names use `Arc<str>` to match [`ParamVec`]; values are per-request data.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Request body as a byte stream
///
/// Bodies are read lazily so a decoder such as
/// [`MultipartDecoder`](crate::multipart::MultipartDecoder) can consume them
/// without the whole payload in one buffer.
pub struct Body(Option<Box<dyn Read + Send>>);

impl Body {
    #[must_use]
    pub fn empty() -> Self {
        Body(None)
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Body(Some(Box::new(reader)))
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::from_reader(Cursor::new(bytes.into()))
    }

    /// True when no stream was ever attached (or it was already taken)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Drain the stream into memory
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.0 {
            Some(r) => r.read(buf),
            None => Ok(0),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "Body(stream)" } else { "Body(empty)" })
    }
}

/// An inbound exchange as seen by middleware and handlers
///
/// Built by the server shell (or by tests) and mutated in place as it flows
/// through the filter layers: each matching entry replaces the path
/// parameters and the matched context.
#[derive(Debug)]
pub struct Request {
    request_id: RequestId,
    method: Method,
    original_path: String,
    path: String,
    query: ParamVec,
    form: ParamVec,
    headers: HeaderVec,
    cookies: HeaderVec,
    body: Body,
    params: ParamVec,
    context: String,
    extensions: Extensions,
    remote_addr: Option<SocketAddr>,
    pending_redirect: Option<String>,
}

impl Request {
    /// Create a request for `uri`, which may carry a query string
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query_str) = match uri.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (uri, None),
        };
        let path = normalize_path(path);
        let query = query_str
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            request_id: RequestId::new(),
            method,
            original_path: path.clone(),
            path,
            query,
            form: ParamVec::new(),
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            body: Body::empty(),
            params: ParamVec::new(),
            context: String::new(),
            extensions: Extensions::default(),
            remote_addr: None,
            pending_redirect: None,
        }
    }

    /// Add a header; `Cookie` headers are also split into cookies
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push_header(name, value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = id;
        self
    }

    #[must_use]
    pub fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    pub(crate) fn push_header(&mut self, name: &str, value: String) {
        if name.eq_ignore_ascii_case("cookie") {
            parse_cookie_header(&value, &mut self.cookies);
        }
        self.headers.push((Arc::from(name), value));
    }

    #[inline]
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[inline]
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path currently being dispatched (changes on redirect)
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path the client asked for
    #[must_use]
    pub fn original_path(&self) -> &str {
        &self.original_path
    }

    /// Full pattern (mount root included) of the entry currently handling the request
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Get a path parameter bound by the most recent matching entry
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn params(&self) -> &ParamVec {
        &self.params
    }

    /// Get a query parameter by name
    ///
    /// Uses "last write wins" semantics: `?limit=10&limit=20` yields `20`.
    #[inline]
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn query_params(&self) -> &ParamVec {
        &self.query
    }

    /// Get a field of an `application/x-www-form-urlencoded` body
    ///
    /// Empty until the body is decoded by [`read_form`](Self::read_form) (or
    /// the [`FormParser`](crate::middleware::FormParser) middleware). Same
    /// "last write wins" semantics as [`query`](Self::query).
    #[must_use]
    pub fn form_query(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn form_queries(&self) -> &ParamVec {
        &self.form
    }

    /// True for an `application/x-www-form-urlencoded` content type
    #[must_use]
    pub fn is_form_urlencoded(&self) -> bool {
        self.content_type().is_some_and(|ct| {
            ct.split(';')
                .next()
                .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_URLENCODED))
        })
    }

    /// Decode a form-urlencoded body into the form fields
    ///
    /// Returns `Ok(false)` and leaves the body alone for any other content
    /// type. The body is consumed otherwise.
    ///
    /// # Errors
    ///
    /// `InvalidData` when the body exceeds `limit` bytes, or the read error.
    pub fn read_form(&mut self, limit: usize) -> io::Result<bool> {
        if !self.is_form_urlencoded() {
            return Ok(false);
        }
        let mut raw = Vec::new();
        self.take_body()
            .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
            .read_to_end(&mut raw)?;
        if raw.len() > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("form body exceeds {limit} bytes"),
            ));
        }
        self.form = url::form_urlencoded::parse(&raw)
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect();
        Ok(true)
    }

    /// The first `Authorization` header that parses
    #[must_use]
    pub fn authorization(&self) -> Option<Authorization> {
        self.authorizations().next()
    }

    /// Every `Authorization` header that parses, in arrival order
    pub fn authorizations(&self) -> impl Iterator<Item = Authorization> + '_ {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("authorization"))
            .filter_map(|(_, v)| Authorization::parse(v))
    }

    #[must_use]
    pub fn has_authorization(&self) -> bool {
        self.authorization().is_some()
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    #[inline]
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn cookies(&self) -> &HeaderVec {
        &self.cookies
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Borrow the body stream
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Take the body stream, leaving an empty one behind
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn insert_extension<T: std::any::Any + Send + Sync>(
        &mut self,
        key: &ExtensionKey<T>,
        value: T,
    ) -> Option<T> {
        self.extensions.insert(key, value)
    }

    #[must_use]
    pub fn extension<T: std::any::Any + Send + Sync>(&self, key: &ExtensionKey<T>) -> Option<&T> {
        self.extensions.get(key)
    }

    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Re-dispatch this request against `path` once the current entry returns
    ///
    /// Only the latest call before the entry returns takes effect. The
    /// response must stay open for the redirect to run.
    pub fn redirect(&mut self, path: &str) {
        self.pending_redirect = Some(normalize_path(path));
    }

    #[must_use]
    pub fn has_pending_redirect(&self) -> bool {
        self.pending_redirect.is_some()
    }

    /// Consume the pending redirect target; the dispatcher is the only caller
    pub(crate) fn take_redirect(&mut self) -> Option<String> {
        self.pending_redirect.take()
    }

    pub(crate) fn set_path(&mut self, path: String) {
        self.path = path;
        self.params.clear();
        self.context.clear();
    }

    pub(crate) fn set_params(&mut self, params: ParamVec) {
        self.params = params;
    }

    pub(crate) fn set_context(&mut self, context: &str) {
        self.context.clear();
        self.context.push_str(context);
    }
}
