use serde::Serialize;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, warn};

use super::request::HeaderVec;
use crate::cookie::Cookie;
use crate::middleware::content_type_for;

/// Reason phrase for the statuses this crate produces itself
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        508 => "Loop Detected",
        _ => "Unknown",
    }
}

/// Outbound side of an exchange
///
/// The first `send*` or `redirect` call closes the response. After that every
/// mutating call logs a warning and does nothing, which is what lets the
/// dispatcher treat "closed" as "someone answered".
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    headers: HeaderVec,
    content_type: Option<String>,
    body: Vec<u8>,
    closed: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            content_type: None,
            body: Vec::new(),
            closed: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// First header value with this name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated header such as `Set-Cookie`
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Split into the pieces the server shell writes to the wire
    #[must_use]
    pub fn into_parts(self) -> (u16, HeaderVec, Option<String>, Vec<u8>) {
        (self.status, self.headers, self.content_type, self.body)
    }

    fn writable(&self, op: &str) -> bool {
        if self.closed {
            warn!(op, status = self.status, "Write to closed response ignored");
            return false;
        }
        true
    }

    pub fn set_status(&mut self, status: u16) -> &mut Self {
        if self.writable("set_status") {
            self.status = status;
        }
        self
    }

    /// Replace any existing header with this name
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if self.writable("set_header") {
            self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
            self.headers.push((Arc::from(name), value.into()));
        }
        self
    }

    /// Add a header without touching existing values of the same name
    pub fn append_header(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        if self.writable("append_header") {
            self.headers.push((Arc::from(name), value.into()));
        }
        self
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> &mut Self {
        if self.writable("set_content_type") {
            self.content_type = Some(content_type.into());
        }
        self
    }

    pub fn set_cookie(&mut self, cookie: &Cookie) -> &mut Self {
        self.append_header("Set-Cookie", cookie.to_string())
    }

    /// Close with an empty body
    pub fn end(&mut self) {
        if self.writable("end") {
            self.closed = true;
        }
    }

    /// Close with a text body (defaults to `text/plain`)
    pub fn send(&mut self, text: impl Into<String>) {
        if !self.writable("send") {
            return;
        }
        if self.content_type.is_none() {
            self.content_type = Some("text/plain; charset=utf-8".to_string());
        }
        self.body = text.into().into_bytes();
        self.closed = true;
    }

    /// Close with a raw body
    pub fn send_bytes(&mut self, bytes: impl Into<Vec<u8>>) {
        if !self.writable("send_bytes") {
            return;
        }
        if self.content_type.is_none() {
            self.content_type = Some("application/octet-stream".to_string());
        }
        self.body = bytes.into();
        self.closed = true;
    }

    /// Close with `value` serialized as JSON
    ///
    /// A serialization failure answers 500 instead.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) {
        if !self.writable("json") {
            return;
        }
        match serde_json::to_vec(value) {
            Ok(bytes) => {
                self.content_type = Some("application/json".to_string());
                self.body = bytes;
            }
            Err(err) => {
                error!(error = %err, "Failed to serialize JSON response body");
                self.status = 500;
                self.content_type = Some("application/json".to_string());
                self.body = br#"{"error":"Internal Server Error"}"#.to_vec();
            }
        }
        self.closed = true;
    }

    /// Close with `status` and its reason phrase as the body
    pub fn send_status(&mut self, status: u16) {
        if !self.writable("send_status") {
            return;
        }
        self.status = status;
        self.send(status_reason(status));
    }

    /// Close with a `302 Found` pointing at `location`
    pub fn redirect(&mut self, location: &str) {
        if !self.writable("redirect") {
            return;
        }
        self.set_header("Location", location);
        self.status = 302;
        self.closed = true;
    }

    /// Close with the contents of `file`, typed by its extension
    ///
    /// Returns `Ok(false)` when the response was already closed or `file` is
    /// not a regular file.
    pub fn send_file(&mut self, file: &Path) -> io::Result<bool> {
        if !self.writable("send_file") || !file.is_file() {
            return Ok(false);
        }
        let bytes = std::fs::read(file)?;
        if self.content_type.is_none() {
            self.content_type = Some(content_type_for(file).to_string());
        }
        self.body = bytes;
        self.closed = true;
        Ok(true)
    }

    /// Like [`send_file`](Self::send_file) but asks the client to download it
    pub fn send_attachment(&mut self, file: &Path) -> io::Result<bool> {
        if self.closed || !file.is_file() {
            return self.send_file(file);
        }
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.set_header(
            "Content-Disposition",
            format!("attachment; filename=\"{name}\""),
        );
        self.send_file(file)
    }
}
