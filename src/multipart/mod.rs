//! # Multipart Module
//!
//! Streaming decoder for RFC 2046 `multipart/*` bodies and the middleware that
//! applies it to `multipart/form-data` requests.
//!
//! ```rust
//! use std::io::Cursor;
//! use strata::multipart::{MultipartDecoder, PartStatus};
//!
//! let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nhello\r\n--B--";
//! let mut decoder = MultipartDecoder::new(Cursor::new(&body[..]), "--B\r\n", None)?;
//! let part = decoder.read()?.expect("one part");
//! assert_eq!(part.name(), Some("f"));
//! assert_eq!(part.bytes(), b"hello");
//! assert_eq!(part.status(), PartStatus::Ok);
//! assert!(decoder.read()?.is_none());
//! # Ok::<(), std::io::Error>(())
//! ```

mod decoder;
mod parser;
mod part;

pub use decoder::{boundary_from_content_type, MultipartDecoder, DEFAULT_MAX_HEAD_SIZE};
pub use parser::{MultipartForm, MultipartParser, MULTIPART};
pub use part::{MultipartPart, PartStatus};
