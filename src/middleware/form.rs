use serde_json::json;
use std::io;
use tracing::{debug, warn};

use crate::dispatcher::{Handler, Request, Response};

/// Decodes `application/x-www-form-urlencoded` bodies into
/// [`Request::form_query`]
///
/// Other content types pass through untouched. A body over `max_size` is
/// answered with `413`, an unreadable one with `400`.
#[derive(Debug, Clone, Copy)]
pub struct FormParser {
    max_size: usize,
}

impl FormParser {
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self { max_size }
    }
}

impl Default for FormParser {
    fn default() -> Self {
        Self::new(64 * 1024)
    }
}

impl Handler for FormParser {
    fn handle(&self, req: &mut Request, res: &mut Response) {
        match req.read_form(self.max_size) {
            Ok(false) => {}
            Ok(true) => {
                debug!(request_id = %req.request_id(), fields = req.form_queries().len(), "Form body decoded");
            }
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(request_id = %req.request_id(), limit = self.max_size, "Form body too large");
                res.set_status(413);
                res.json(&json!({ "error": "Payload Too Large", "limit": self.max_size }));
            }
            Err(err) => {
                warn!(request_id = %req.request_id(), error = %err, "Form body unreadable");
                res.set_status(400);
                res.json(&json!({ "error": "Bad Request", "message": err.to_string() }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Body;
    use http::Method;

    fn form_request(body: &str) -> Request {
        Request::new(Method::POST, "/")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(Body::from_bytes(body.to_string()))
    }

    #[test]
    fn test_decodes_form() {
        let mut req = form_request("name=ada&lang=rust");
        let mut res = Response::new();
        FormParser::default().handle(&mut req, &mut res);
        assert!(!res.is_closed());
        assert_eq!(req.form_query("name"), Some("ada"));
        assert_eq!(req.form_query("lang"), Some("rust"));
    }

    #[test]
    fn test_oversized_form_gets_413() {
        let mut req = form_request("name=ada&lang=rust");
        let mut res = Response::new();
        FormParser::new(4).handle(&mut req, &mut res);
        assert!(res.is_closed());
        assert_eq!(res.status(), 413);
    }

    #[test]
    fn test_other_content_types_untouched() {
        let mut req = Request::new(Method::POST, "/")
            .with_header("Content-Type", "text/plain")
            .with_body(Body::from_bytes("a=1"));
        let mut res = Response::new();
        FormParser::default().handle(&mut req, &mut res);
        assert!(!res.is_closed());
        assert!(req.form_queries().is_empty());
        assert!(!req.body_mut().is_empty());
    }
}
