use http::Method;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::dispatcher::{Handler, Request, Response};

/// MIME type for a file, chosen by extension
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// What to do with paths that contain a dot-prefixed segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DotFiles {
    /// Leave the exchange open so later entries can answer it
    #[default]
    Ignore,
    /// Answer `403`
    Deny,
    /// Serve like any other file
    Allow,
}

/// Serves files below a base directory
///
/// Mount it under a prefix through a [`Router`](crate::router::Router); the
/// prefix is stripped before the file is looked up, so a router holding
/// `StaticFiles::new("public")` mounted at `/assets` maps `/assets/app.css`
/// to `public/app.css`. Directory requests fall back
/// to `index.html`. Anything that is not a plain file below the base is left
/// for later entries.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
    index: String,
    dot_files: DotFiles,
    extensions: Option<Vec<String>>,
    max_age: Option<u64>,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base_dir: base.into(),
            index: "index.html".to_string(),
            dot_files: DotFiles::default(),
            extensions: None,
            max_age: None,
        }
    }

    #[must_use]
    pub fn index(mut self, file: &str) -> Self {
        self.index = file.to_string();
        self
    }

    #[must_use]
    pub fn dot_files(mut self, policy: DotFiles) -> Self {
        self.dot_files = policy;
        self
    }

    /// Only serve files with one of these extensions (without the dot)
    #[must_use]
    pub fn extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = Some(extensions.iter().map(|e| e.to_ascii_lowercase()).collect());
        self
    }

    /// Emit `Cache-Control: max-age=<seconds>`
    #[must_use]
    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a URL path onto the base directory
    ///
    /// Returns `None` for anything that would escape it (`..`, absolute
    /// components, drive prefixes).
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    fn has_dot_segment(url_path: &str) -> bool {
        url_path
            .split('/')
            .any(|seg| seg.starts_with('.') && seg != "." && seg != "..")
    }

    fn extension_allowed(&self, file: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        file.extension()
            .and_then(|s| s.to_str())
            .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Resolve the file for `url_path`, or `None` when nothing should be served
    pub fn resolve(&self, url_path: &str) -> Option<PathBuf> {
        let mut file = self.map_path(url_path)?;
        if file.is_dir() {
            file.push(&self.index);
        }
        if !file.is_file() || !self.extension_allowed(&file) {
            return None;
        }
        Some(file)
    }

    fn serve(&self, file: &Path, res: &mut Response) -> io::Result<bool> {
        if let Some(max_age) = self.max_age {
            res.set_header("Cache-Control", format!("max-age={max_age}"));
        }
        res.send_file(file)
    }
}

/// Path relative to the matched mount prefix
///
/// `context` is the pattern of the entry being run: `*` at the root, or
/// `<prefix>/*` when mounted.
fn relative_path<'a>(context: &str, path: &'a str) -> &'a str {
    let prefix = context.trim_end_matches('*').trim_end_matches('/');
    if prefix.is_empty() {
        return path;
    }
    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

impl Handler for StaticFiles {
    fn handle(&self, req: &mut Request, res: &mut Response) {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return;
        }

        let rel = relative_path(req.context(), req.path());
        if Self::has_dot_segment(rel) {
            match self.dot_files {
                DotFiles::Ignore => return,
                DotFiles::Deny => {
                    res.send_status(403);
                    return;
                }
                DotFiles::Allow => {}
            }
        }

        let Some(file) = self.resolve(rel) else {
            return;
        };
        match self.serve(&file, res) {
            Ok(true) => {
                debug!(request_id = %req.request_id(), file = %file.display(), "Static file served");
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    request_id = %req.request_id(),
                    file = %file.display(),
                    error = %e,
                    "Failed to read static file"
                );
                res.send_status(500);
            }
        }
    }
}
