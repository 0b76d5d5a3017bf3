use parking_lot::Mutex;
use std::io::{self, Read};
use std::str::FromStr;
use std::sync::Arc;

use crate::dispatcher::{Body, Request};
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::multipart::boundary_from_content_type;

/// Why an incoming request could not be turned into a [`Request`]
#[derive(Debug)]
pub enum IntakeError {
    /// Method token rejected by `http::Method`
    BadMethod(String),
    /// Declared body length exceeds `max_body_size`
    TooLarge { limit: usize },
}

/// Convert the head of a `tiny_http` request into a dispatchable [`Request`]
///
/// No body is attached here; see [`attach_body`]. A non-multipart request
/// whose `Content-Length` exceeds `max_body_size` is refused up front. An
/// inbound `X-Request-ID` is kept when it parses, otherwise a fresh one is
/// minted.
pub fn convert_request(rq: &tiny_http::Request, max_body_size: usize) -> Result<Request, IntakeError> {
    let method_str = rq.method().as_str().to_string();
    let method = http::Method::from_str(&method_str)
        .map_err(|_| IntakeError::BadMethod(method_str.clone()))?;

    let mut req = Request::new(method, rq.url()).with_remote_addr(rq.remote_addr().copied());
    let mut request_id = None;
    for header in rq.headers() {
        let name = header.field.as_str().as_str();
        let value = header.value.as_str();
        if name.eq_ignore_ascii_case(REQUEST_ID_HEADER) {
            request_id = Some(value.to_string());
        }
        req.push_header(name, value.to_string());
    }
    req = req.with_request_id(RequestId::from_header_or_new(request_id.as_deref()));

    if !is_multipart(&req) && rq.body_length().is_some_and(|len| len > max_body_size) {
        return Err(IntakeError::TooLarge {
            limit: max_body_size,
        });
    }
    Ok(req)
}

fn is_multipart(req: &Request) -> bool {
    req.content_type()
        .is_some_and(|ct| boundary_from_content_type(ct).is_some())
}

/// Stream the body of `exchange` into `req`
///
/// Multipart bodies reach the decoder straight off the connection, so their
/// memory is bounded per part rather than by `max_body_size`. Any other body
/// fails with `InvalidData` once more than `max_body_size` bytes are read.
pub(crate) fn attach_body(
    req: Request,
    exchange: &Arc<Mutex<tiny_http::Request>>,
    max_body_size: usize,
) -> Request {
    if exchange.lock().body_length() == Some(0) {
        return req;
    }
    let stream = TransportBody {
        exchange: Arc::clone(exchange),
    };
    if is_multipart(&req) {
        req.with_body(Body::from_reader(stream))
    } else {
        req.with_body(Body::from_reader(LimitedBody::new(stream, max_body_size)))
    }
}

/// Reads the request body from the connection it arrived on
///
/// Shares the exchange with the server thread, which takes it back to
/// respond once dispatch has finished and the body is released.
struct TransportBody {
    exchange: Arc<Mutex<tiny_http::Request>>,
}

impl Read for TransportBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.exchange.lock().as_reader().read(buf)
    }
}

/// Fails a body stream that grows past `limit` bytes
pub struct LimitedBody<R> {
    inner: R,
    remaining: usize,
    limit: usize,
}

impl<R: Read> LimitedBody<R> {
    pub fn new(inner: R, limit: usize) -> Self {
        Self {
            inner,
            remaining: limit,
            limit,
        }
    }
}

impl<R: Read> Read for LimitedBody<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        // one byte past the limit is enough to tell an oversized body apart
        let want = buf.len().min(self.remaining.saturating_add(1));
        let n = self.inner.read(&mut buf[..want])?;
        if n > self.remaining {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("request body exceeds {} bytes", self.limit),
            ));
        }
        self.remaining -= n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_limited_body_within_limit() {
        let mut body = LimitedBody::new(Cursor::new(b"hello".to_vec()), 5);
        let mut out = Vec::new();
        body.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_limited_body_over_limit() {
        let mut body = LimitedBody::new(Cursor::new(vec![b'x'; 100]), 10);
        let mut out = Vec::new();
        let err = body.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(out.len() <= 10);
    }
}
