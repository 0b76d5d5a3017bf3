use serde_json::Value;
use std::io::Cursor;
use tracing::warn;

use crate::dispatcher::Response;

/// Close `res` with a JSON error body
pub fn write_json_error(res: &mut Response, status: u16, body: Value) {
    res.set_status(status).json(&body);
}

/// Build a standalone JSON error response
#[must_use]
pub fn json_error(status: u16, body: Value) -> Response {
    let mut res = Response::new();
    write_json_error(&mut res, status, body);
    res
}

/// Convert a finished [`Response`] into its `tiny_http` form
pub fn into_wire(res: Response) -> tiny_http::Response<Cursor<Vec<u8>>> {
    let (status, headers, content_type, body) = res.into_parts();
    let mut wire =
        tiny_http::Response::from_data(body).with_status_code(tiny_http::StatusCode(status));
    if let Some(ct) = content_type {
        wire = push_header(wire, "Content-Type", &ct);
    }
    for (name, value) in &headers {
        wire = push_header(wire, name, value);
    }
    wire
}

fn push_header(
    wire: tiny_http::Response<Cursor<Vec<u8>>>,
    name: &str,
    value: &str,
) -> tiny_http::Response<Cursor<Vec<u8>>> {
    match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
        Ok(header) => wire.with_header(header),
        Err(()) => {
            warn!(header = name, "Dropping response header with invalid bytes");
            wire
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_error() {
        let res = json_error(404, json!({ "error": "Not Found" }));
        assert!(res.is_closed());
        assert_eq!(res.status(), 404);
        assert_eq!(res.content_type(), Some("application/json"));
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["error"], "Not Found");
    }

    #[test]
    fn test_into_wire_status() {
        let mut res = Response::new();
        res.set_status(201).set_header("X-Id", "7").send("made");
        let wire = into_wire(res);
        assert_eq!(wire.status_code().0, 201);
    }
}
