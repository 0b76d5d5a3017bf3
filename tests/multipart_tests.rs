//! Integration tests for the streaming multipart decoder and its middleware

use http::Method;
use std::io::{self, Cursor, Read};
use strata::dispatcher::Body;
use strata::multipart::{MultipartDecoder, MultipartParser, PartStatus, MULTIPART};
use strata::{Handler, Request, Response};

/// Hands out at most `chunk` bytes per read
struct Trickle {
    inner: Cursor<Vec<u8>>,
    chunk: usize,
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk);
        self.inner.read(&mut buf[..n])
    }
}

fn form_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"--XyZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nQuarterly\r\n");
    body.extend_from_slice(
        b"--XyZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"r.bin\"\r\n\
          Content-Type: application/octet-stream\r\n\r\n",
    );
    // Near-miss of the delimiter inside the payload
    body.extend_from_slice(b"\x00\x01\r\n--XyQ\r\n--X\xff");
    body.extend_from_slice(b"\r\n--XyZ--\r\n");
    body
}

#[test]
fn test_single_part_boundary() {
    let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nhello\r\n--B--".to_vec();
    let parts = MultipartDecoder::new(Cursor::new(body), "--B", None)
        .unwrap()
        .read_all()
        .unwrap();
    assert_eq!(parts.len(), 1);
    assert!(parts[0].head().contains("name=\"f\""));
    assert_eq!(parts[0].bytes(), b"hello");
}

#[test]
fn test_size_cap_flags_part() {
    let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nhello\r\n--B--".to_vec();
    let mut decoder = MultipartDecoder::new(Cursor::new(body), "--B", Some(3)).unwrap();
    let part = decoder.read().unwrap().unwrap();
    assert_eq!(part.status(), PartStatus::OutOfSize);
    assert_ne!(part.bytes(), b"hello");
}

#[test]
fn test_byte_at_a_time_stream() {
    let reader = Trickle {
        inner: Cursor::new(form_body()),
        chunk: 1,
    };
    let parts: Vec<_> = MultipartDecoder::new(reader, "XyZ", None)
        .unwrap()
        .collect::<io::Result<Vec<_>>>()
        .unwrap();

    assert_eq!(parts.len(), 2);
    assert_eq!(parts[0].name(), Some("title"));
    assert_eq!(parts[0].text(), Some("Quarterly"));
    assert_eq!(parts[1].filename(), Some("r.bin"));
    assert_eq!(parts[1].content_type(), Some("application/octet-stream"));
    assert_eq!(parts[1].bytes(), b"\x00\x01\r\n--XyQ\r\n--X\xff");
}

#[test]
fn test_only_oversized_part_dropped() {
    let parts = MultipartDecoder::new(Cursor::new(form_body()), "XyZ", Some(10))
        .unwrap()
        .read_all()
        .unwrap();
    assert_eq!(parts[0].status(), PartStatus::Ok);
    assert_eq!(parts[0].bytes(), b"Quarterly");
    assert_eq!(parts[1].status(), PartStatus::OutOfSize);
    assert!(parts[1].bytes().is_empty());
}

#[test]
fn test_parser_middleware_populates_form() {
    let mut req = Request::new(Method::POST, "/upload")
        .with_header("Content-Type", "multipart/form-data; boundary=XyZ")
        .with_body(Body::from_bytes(form_body()));
    let mut res = Response::new();
    MultipartParser::new(None).handle(&mut req, &mut res);

    assert!(!res.is_closed());
    let form = req.extension(&MULTIPART).unwrap();
    assert_eq!(form.len(), 2);
    assert_eq!(form.text("title"), Some("Quarterly"));
    assert_eq!(form.files().count(), 1);
    assert!(!form.has_oversized());
}

#[test]
fn test_parser_ignores_other_content_types() {
    let mut req = Request::new(Method::POST, "/upload")
        .with_header("Content-Type", "application/json")
        .with_body(Body::from_bytes("{}"));
    let mut res = Response::new();
    MultipartParser::default().handle(&mut req, &mut res);
    assert!(req.extension(&MULTIPART).is_none());
    assert!(!req.body_mut().is_empty());
}

#[test]
fn test_empty_boundary_rejected() {
    let err = MultipartDecoder::new(Cursor::new(Vec::new()), "--", None).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
}
