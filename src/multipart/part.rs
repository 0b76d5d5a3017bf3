/// Outcome of decoding one part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartStatus {
    Ok,
    /// Data exceeded the decoder's `max_size`; the part carries its head only
    OutOfSize,
}

/// One body part: the raw header block and the data bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartPart {
    head: String,
    status: PartStatus,
    bytes: Vec<u8>,
}

impl MultipartPart {
    #[must_use]
    pub fn new(head: String, status: PartStatus, bytes: Vec<u8>) -> Self {
        Self { head, status, bytes }
    }

    /// Header lines, each terminated by CRLF
    #[must_use]
    pub fn head(&self) -> &str {
        &self.head
    }

    #[must_use]
    pub fn status(&self) -> PartStatus {
        self.status
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Data as text, if it is valid UTF-8
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    /// Value of one header line (case-insensitive name)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.split("\r\n").find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    /// The `name` parameter of `Content-Disposition`
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.disposition_param("name")
    }

    /// The `filename` parameter of `Content-Disposition`
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.disposition_param("filename")
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    fn disposition_param(&self, param: &str) -> Option<&str> {
        let disposition = self.header("content-disposition")?;
        disposition.split(';').skip(1).find_map(|p| {
            let (key, value) = p.trim().split_once('=')?;
            if !key.trim().eq_ignore_ascii_case(param) {
                return None;
            }
            let value = value.trim();
            Some(
                value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value),
            )
        })
    }
}
