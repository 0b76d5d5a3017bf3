use std::io::{self, BufRead, BufReader, Read};

use super::part::{MultipartPart, PartStatus};

/// The stream is scanned as if it began with this, so a delimiter at byte 0
/// is found by the same `CRLF--boundary` marker as every later one
const PRIME: &[u8; 2] = b"\r\n";

/// Largest part head buffered while looking for the blank line that ends it
pub const DEFAULT_MAX_HEAD_SIZE: usize = 16 * 1024;

/// Streaming `multipart/*` body splitter
///
/// Reads the body one byte at a time through a buffered reader and matches the
/// delimiter incrementally with a KMP failure table, so the only bytes held
/// back from the current part are the (at most boundary-length) prefix that
/// might still turn into a delimiter. Part bytes are buffered per part, and a
/// part whose data outgrows `max_size` is reported as
/// [`PartStatus::OutOfSize`] and then skipped without buffering. A head that
/// grows past `max_head_size` before its blank line is treated the same way.
#[derive(Debug)]
pub struct MultipartDecoder<R: Read> {
    reader: BufReader<R>,
    marker: Vec<u8>,
    failure: Vec<usize>,
    max_size: Option<usize>,
    max_head_size: usize,
    primed: usize,
    matched: usize,
    in_body: bool,
    skipping: bool,
    done: bool,
    part: Vec<u8>,
    head_end: Option<usize>,
    data_start: usize,
}

impl<R: Read> MultipartDecoder<R> {
    /// Create a decoder for `delimiter`
    ///
    /// `delimiter` is the dash-boundary as it appears on the wire, `--` plus
    /// the boundary, optionally followed by CRLF (`--XyZ\r\n`). A bare
    /// boundary is accepted too, as long as it does not itself start with
    /// `--`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the boundary is empty.
    pub fn new(reader: R, delimiter: &str, max_size: Option<usize>) -> io::Result<Self> {
        let boundary = delimiter.strip_suffix("\r\n").unwrap_or(delimiter);
        let boundary = boundary.strip_prefix("--").unwrap_or(boundary);
        if boundary.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "multipart boundary is empty",
            ));
        }

        let mut marker = Vec::with_capacity(boundary.len() + 4);
        marker.extend_from_slice(b"\r\n--");
        marker.extend_from_slice(boundary.as_bytes());
        let failure = failure_table(&marker);

        Ok(Self {
            reader: BufReader::new(reader),
            marker,
            failure,
            max_size,
            max_head_size: DEFAULT_MAX_HEAD_SIZE,
            primed: 0,
            matched: 0,
            in_body: false,
            skipping: false,
            done: false,
            part: Vec::new(),
            head_end: None,
            data_start: 0,
        })
    }

    /// Create a decoder from a `Content-Type: multipart/...; boundary=...` value
    ///
    /// # Errors
    ///
    /// `InvalidInput` when the header is not a multipart type or carries no
    /// boundary parameter.
    pub fn from_content_type(reader: R, content_type: &str, max_size: Option<usize>) -> io::Result<Self> {
        let boundary = boundary_from_content_type(content_type).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a multipart content type with a boundary: {content_type}"),
            )
        })?;
        Self::new(reader, &format!("--{boundary}"), max_size)
    }

    /// Cap on the bytes buffered for one part head
    #[must_use]
    pub fn with_max_head_size(mut self, max_head_size: usize) -> Self {
        self.max_head_size = max_head_size;
        self
    }

    /// Next part, or `None` once the closing delimiter (or end of stream) is reached
    ///
    /// # Errors
    ///
    /// Errors from the underlying reader are returned as is; the decoder should
    /// not be used afterwards.
    pub fn read(&mut self) -> io::Result<Option<MultipartPart>> {
        loop {
            if self.done {
                return Ok(None);
            }

            let Some(byte) = self.next_byte()? else {
                return Ok(self.finish());
            };

            if !self.advance(byte) {
                if let Some(part) = self.check_size() {
                    return Ok(Some(part));
                }
                continue;
            }

            let last = self.consume_delimiter_tail()?;
            let finished = self.take_part();
            self.in_body = true;
            self.skipping = false;
            if last {
                self.done = true;
            }
            if finished.is_some() {
                return Ok(finished);
            }
            // zero-length part (or the preamble): keep scanning
        }
    }

    /// Collect every remaining part
    ///
    /// # Errors
    ///
    /// The first read error.
    pub fn read_all(&mut self) -> io::Result<Vec<MultipartPart>> {
        let mut parts = Vec::new();
        while let Some(part) = self.read()? {
            parts.push(part);
        }
        Ok(parts)
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        if let Some(&b) = PRIME.get(self.primed) {
            self.primed += 1;
            return Ok(Some(b));
        }
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => {
                    let Some(&b) = buf.first() else {
                        return Ok(None);
                    };
                    self.reader.consume(1);
                    return Ok(Some(b));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Feed one byte to the matcher; true when it completed a delimiter
    fn advance(&mut self, byte: u8) -> bool {
        while self.matched > 0 && self.marker[self.matched] != byte {
            let keep = self.failure[self.matched - 1];
            self.release(self.matched - keep);
            self.matched = keep;
        }
        if self.marker[self.matched] == byte {
            self.matched += 1;
            if self.matched == self.marker.len() {
                self.matched = 0;
                return true;
            }
        } else {
            self.collect(byte);
        }
        false
    }

    /// Held-back bytes turned out not to be a delimiter
    fn release(&mut self, count: usize) {
        for i in 0..count {
            let b = self.marker[i];
            self.collect(b);
        }
    }

    fn collect(&mut self, byte: u8) {
        if !self.in_body || self.skipping {
            return;
        }
        self.part.push(byte);
        if self.head_end.is_none() {
            if self.part == b"\r\n" {
                self.head_end = Some(0);
                self.data_start = 2;
            } else if self.part.ends_with(b"\r\n\r\n") {
                self.head_end = Some(self.part.len() - 2);
                self.data_start = self.part.len();
            }
        }
    }

    fn check_size(&mut self) -> Option<MultipartPart> {
        if self.skipping {
            return None;
        }
        let head = match self.head_end {
            None if self.part.len() > self.max_head_size => {
                String::from_utf8_lossy(&self.part[..self.max_head_size]).into_owned()
            }
            Some(head_end)
                if self
                    .max_size
                    .is_some_and(|max| self.part.len() - self.data_start > max) =>
            {
                String::from_utf8_lossy(&self.part[..head_end]).into_owned()
            }
            _ => return None,
        };
        self.reset_part();
        self.skipping = true;
        Some(MultipartPart::new(head, PartStatus::OutOfSize, Vec::new()))
    }

    /// After `--boundary`: `--` closes the body, anything else runs to the end of the line
    fn consume_delimiter_tail(&mut self) -> io::Result<bool> {
        let Some(mut b) = self.next_byte()? else {
            return Ok(true);
        };
        if b == b'-' {
            match self.next_byte()? {
                Some(b'-') | None => return Ok(true),
                Some(other) => b = other,
            }
        }
        while b != b'\n' {
            match self.next_byte()? {
                Some(next) => b = next,
                None => return Ok(true),
            }
        }
        Ok(false)
    }

    fn take_part(&mut self) -> Option<MultipartPart> {
        if !self.in_body || self.skipping || self.part.is_empty() {
            self.reset_part();
            return None;
        }
        let part = match self.head_end {
            Some(head_end) => MultipartPart::new(
                String::from_utf8_lossy(&self.part[..head_end]).into_owned(),
                PartStatus::Ok,
                self.part[self.data_start..].to_vec(),
            ),
            None => MultipartPart::new(
                String::from_utf8_lossy(&self.part).into_owned(),
                PartStatus::Ok,
                Vec::new(),
            ),
        };
        self.reset_part();
        Some(part)
    }

    /// End of stream without a closing delimiter: whatever is pending is the last part
    fn finish(&mut self) -> Option<MultipartPart> {
        let held = self.matched;
        self.matched = 0;
        self.release(held);
        self.done = true;
        self.take_part()
    }

    fn reset_part(&mut self) {
        self.part.clear();
        self.head_end = None;
        self.data_start = 0;
    }
}

impl<R: Read> Iterator for MultipartDecoder<R> {
    type Item = io::Result<MultipartPart>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// KMP prefix function: `table[i]` is the length of the longest proper prefix
/// of `pattern[..=i]` that is also a suffix of it
fn failure_table(pattern: &[u8]) -> Vec<usize> {
    let mut table = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = table[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        table[i] = k;
    }
    table
}

/// Extract the `boundary` parameter of a multipart content type
#[must_use]
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }
    params.find_map(|p| {
        let (key, value) = p.trim().split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then(|| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decoder(body: &[u8], max: Option<usize>) -> MultipartDecoder<Cursor<Vec<u8>>> {
        MultipartDecoder::new(Cursor::new(body.to_vec()), "--B\r\n", max).unwrap()
    }

    #[test]
    fn test_failure_table() {
        assert_eq!(failure_table(b"\r\n--B"), vec![0, 0, 0, 0, 0]);
        assert_eq!(failure_table(b"abab"), vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_single_part_without_trailing_crlf() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nhello\r\n--B--";
        let mut dec = decoder(body, None);
        let part = dec.read().unwrap().unwrap();
        assert!(part.head().contains("name=\"f\""));
        assert_eq!(part.bytes(), b"hello");
        assert_eq!(part.status(), PartStatus::Ok);
        assert!(dec.read().unwrap().is_none());
    }

    #[test]
    fn test_out_of_size() {
        let body = b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n\r\nhello\r\n--B--";
        let mut dec = decoder(body, Some(3));
        let part = dec.read().unwrap().unwrap();
        assert_eq!(part.status(), PartStatus::OutOfSize);
        assert!(part.bytes().is_empty());
        assert_eq!(part.name(), Some("f"));
        assert!(dec.read().unwrap().is_none());
    }

    #[test]
    fn test_unterminated_head_is_capped() {
        let mut body = b"--B\r\nContent-Disposition: form-data; name=\"f\"\r\n".to_vec();
        body.extend(vec![b'x'; 100_000]);
        body.extend_from_slice(b"\r\n--B\r\nX: 1\r\n\r\nok\r\n--B--");

        let mut dec = decoder(&body, Some(3));
        let part = dec.read().unwrap().unwrap();
        assert_eq!(part.status(), PartStatus::OutOfSize);
        assert!(part.bytes().is_empty());
        assert_eq!(part.head().len(), DEFAULT_MAX_HEAD_SIZE);
        assert_eq!(part.name(), Some("f"));

        let next = dec.read().unwrap().unwrap();
        assert_eq!(next.status(), PartStatus::Ok);
        assert_eq!(next.bytes(), b"ok");
        assert!(dec.read().unwrap().is_none());
    }

    #[test]
    fn test_head_cap_applies_without_part_limit() {
        let mut body = b"--B\r\nX-Long: ".to_vec();
        body.extend(vec![b'y'; 64]);
        body.extend_from_slice(b"\r\n\r\ndata\r\n--B--");

        let mut dec = decoder(&body, None).with_max_head_size(32);
        let part = dec.read().unwrap().unwrap();
        assert_eq!(part.status(), PartStatus::OutOfSize);
        assert!(dec.read().unwrap().is_none());

        let parts = decoder(&body, None).read_all().unwrap();
        assert_eq!(parts[0].bytes(), b"data");
    }

    #[test]
    fn test_preamble_and_epilogue_ignored() {
        let body = b"preamble text\r\n--B\r\nX-A: 1\r\n\r\ndata\r\n--B--\r\nepilogue";
        let parts = decoder(body, None).read_all().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].bytes(), b"data");
        assert_eq!(parts[0].head(), "X-A: 1\r\n");
    }

    #[test]
    fn test_empty_part_skipped() {
        let body = b"--B\r\n\r\n--B\r\nX: y\r\n\r\nz\r\n--B--";
        let parts = decoder(body, None).read_all().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].bytes(), b"z");
    }

    #[test]
    fn test_partial_marker_inside_data() {
        // "\r\n--" and "\r\n--C" look like the start of a delimiter but are data
        let body = b"--B\r\nX: 1\r\n\r\na\r\n--C\r\n-b\r\n\r\n--B--";
        let parts = decoder(body, None).read_all().unwrap();
        assert_eq!(parts[0].bytes(), b"a\r\n--C\r\n-b\r\n");
    }

    #[test]
    fn test_part_without_headers() {
        let body = b"--B\r\n\r\nraw\r\n--B--";
        let parts = decoder(body, None).read_all().unwrap();
        assert_eq!(parts[0].head(), "");
        assert_eq!(parts[0].bytes(), b"raw");
    }

    #[test]
    fn test_missing_close_delimiter_yields_pending_part() {
        let body = b"--B\r\nX: 1\r\n\r\ntail\r\n--";
        let parts = decoder(body, None).read_all().unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].bytes(), b"tail\r\n--");
    }

    #[test]
    fn test_boundary_from_content_type() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"abc 1\"").as_deref(),
            Some("abc 1")
        );
        assert_eq!(
            boundary_from_content_type("Multipart/Mixed;charset=utf-8; Boundary=x").as_deref(),
            Some("x")
        );
        assert!(boundary_from_content_type("text/plain; boundary=x").is_none());
        assert!(boundary_from_content_type("multipart/form-data").is_none());
    }

    #[test]
    fn test_empty_boundary_rejected() {
        let err = MultipartDecoder::new(Cursor::new(Vec::new()), "--\r\n", None)
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
