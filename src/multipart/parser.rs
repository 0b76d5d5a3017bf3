use serde_json::json;
use tracing::{debug, warn};

use super::decoder::{boundary_from_content_type, MultipartDecoder};
use super::part::{MultipartPart, PartStatus};
use crate::dispatcher::{Handler, Request, Response};
use crate::extensions::ExtensionKey;

/// Extension under which [`MultipartParser`] stores the decoded body
pub static MULTIPART: ExtensionKey<MultipartForm> = ExtensionKey::new("multipart");

/// Decoded parts of a `multipart/form-data` body, in wire order
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    parts: Vec<MultipartPart>,
}

impl MultipartForm {
    #[must_use]
    pub fn new(parts: Vec<MultipartPart>) -> Self {
        Self { parts }
    }

    /// First part whose field name is `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&MultipartPart> {
        self.parts.iter().find(|p| p.name() == Some(name))
    }

    /// Text value of field `name`
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(MultipartPart::text)
    }

    /// Parts that carry a `filename`
    pub fn files(&self) -> impl Iterator<Item = &MultipartPart> {
        self.parts.iter().filter(|p| p.filename().is_some())
    }

    /// True when any part was cut off by the size limit
    #[must_use]
    pub fn has_oversized(&self) -> bool {
        self.parts.iter().any(|p| p.status() == PartStatus::OutOfSize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MultipartPart> {
        self.parts.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Middleware decoding `multipart/*` request bodies into [`MULTIPART`]
///
/// Requests with another content type pass through untouched. A body that
/// fails to read is answered with `400 Bad Request`.
#[derive(Debug, Clone, Default)]
pub struct MultipartParser {
    max_part_size: Option<usize>,
}

impl MultipartParser {
    #[must_use]
    pub fn new(max_part_size: Option<usize>) -> Self {
        Self { max_part_size }
    }
}

impl Handler for MultipartParser {
    fn handle(&self, req: &mut Request, res: &mut Response) {
        let Some(content_type) = req.content_type().map(str::to_string) else {
            return;
        };
        if boundary_from_content_type(&content_type).is_none() {
            return;
        }

        let body = req.take_body();
        let parts = MultipartDecoder::from_content_type(body, &content_type, self.max_part_size)
            .and_then(|mut decoder| decoder.read_all());

        match parts {
            Ok(parts) => {
                debug!(request_id = %req.request_id(), parts = parts.len(), "Multipart body decoded");
                req.insert_extension(&MULTIPART, MultipartForm::new(parts));
            }
            Err(err) => {
                warn!(request_id = %req.request_id(), error = %err, "Multipart body rejected");
                res.set_status(400);
                res.json(&json!({ "error": "Bad Request", "message": err.to_string() }));
            }
        }
    }
}
