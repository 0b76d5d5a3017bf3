use base64::{engine::general_purpose, Engine as _};
use std::fmt;

/// A parsed `Authorization` header: `<type> <credentials>`
///
/// ```rust
/// use strata::dispatcher::Authorization;
///
/// let auth = Authorization::parse("Basic YWRhOmxvdmVsYWNl").unwrap();
/// assert_eq!(auth.kind(), "Basic");
/// assert_eq!(auth.basic_credentials(), Some(("ada".to_string(), "lovelace".to_string())));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    kind: String,
    data: String,
}

impl Authorization {
    /// Split a header value at its first space
    ///
    /// Returns `None` when there is no space or the type is empty.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let (kind, data) = header.trim().split_once(' ')?;
        if kind.is_empty() {
            return None;
        }
        Some(Self {
            kind: kind.to_string(),
            data: data.trim().to_string(),
        })
    }

    /// The scheme, as sent (`Basic`, `Bearer`, ...)
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The credentials following the scheme
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Case-insensitive scheme comparison
    #[must_use]
    pub fn is(&self, kind: &str) -> bool {
        self.kind.eq_ignore_ascii_case(kind)
    }

    /// The credentials base64-decoded, `None` if they are not valid base64
    #[must_use]
    pub fn decoded_data(&self) -> Option<Vec<u8>> {
        general_purpose::STANDARD.decode(&self.data).ok()
    }

    /// `user:password` of a `Basic` header
    #[must_use]
    pub fn basic_credentials(&self) -> Option<(String, String)> {
        if !self.is("basic") {
            return None;
        }
        let decoded = String::from_utf8(self.decoded_data()?).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_string(), password.to_string()))
    }
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.data)
    }
}
