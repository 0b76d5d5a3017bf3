//! Path pattern compilation and matching - hot path for every dispatch pass.
//!
//! Patterns are compiled once at registration into a flat token list and
//! matched with a single forward scan over the request path. There is no
//! regex engine and no backtracking: compilation is O(pattern length) and
//! matching is O(path length).
//!
//! | Pattern piece | Matches |
//! |---------------|---------|
//! | `users`       | the literal characters |
//! | `:id`         | one segment, possibly empty, bound as `id` (percent-decoded) |
//! | `*` segment   | one segment, possibly empty, unbound |
//! | `*` alone     | every path, without scanning |

use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Maximum number of path parameters before heap allocation.
/// Most routes have ≤4 parameters (e.g., /users/:id/posts/:post_id).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Param names use `Arc<str>` because they come from the compiled pattern and
/// are cloned into every match; values are per-request `String`s.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Param(Arc<str>),
    Wildcard,
}

/// A compiled path pattern such as `/user/:id/:action`
#[derive(Debug, Clone)]
pub struct PathPattern {
    source: String,
    kind: PatternKind,
}

#[derive(Debug, Clone)]
enum PatternKind {
    /// `*`: matches everything, optionally limited to a mount scope
    Any { scope: Option<String> },
    Tokens(Vec<Token>),
}

impl PathPattern {
    /// Compile a pattern relative to the server root
    #[must_use]
    pub fn compile(pattern: &str) -> Self {
        Self::compile_rooted("/", pattern)
    }

    /// Compile a pattern under a mount root such as `/api`
    ///
    /// A universal `*` pattern under a non-root mount becomes scoped: it matches
    /// the root itself and everything below it, and nothing else.
    #[must_use]
    pub fn compile_rooted(root: &str, pattern: &str) -> Self {
        let root = trim_root(root);

        if pattern.trim() == "*" {
            let scope = (!root.is_empty()).then(|| root.clone());
            let source = match &scope {
                Some(s) => format!("{s}/*"),
                None => "*".to_string(),
            };
            return Self {
                source,
                kind: PatternKind::Any { scope },
            };
        }

        let full = join_root(&root, pattern);
        let tokens = tokenize(&full);
        Self {
            source: full,
            kind: PatternKind::Tokens(tokens),
        }
    }

    /// True for the universal `*` pattern (scoped or not)
    #[inline]
    #[must_use]
    pub fn is_universal(&self) -> bool {
        matches!(self.kind, PatternKind::Any { .. })
    }

    /// The normalized full pattern, including any mount root
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Names of the parameters this pattern binds, in order
    pub fn param_names(&self) -> impl Iterator<Item = &str> + '_ {
        let tokens: &[Token] = match &self.kind {
            PatternKind::Tokens(t) => t,
            PatternKind::Any { .. } => &[],
        };
        tokens.iter().filter_map(|t| match t {
            Token::Param(name) => Some(name.as_ref()),
            _ => None,
        })
    }

    /// Match a raw request path (no query string) against this pattern
    ///
    /// Returns the bound parameters on success, `None` when the path does not
    /// fit. Each captured value is percent-decoded exactly once.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<ParamVec> {
        match &self.kind {
            PatternKind::Any { scope: None } => Some(ParamVec::new()),
            PatternKind::Any { scope: Some(scope) } => {
                let rest = path.strip_prefix(scope.as_str())?;
                (rest.is_empty() || rest.starts_with('/')).then(ParamVec::new)
            }
            PatternKind::Tokens(tokens) => scan(tokens, path),
        }
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn scan(tokens: &[Token], path: &str) -> Option<ParamVec> {
    let mut rest = path;
    let mut params = ParamVec::new();

    for token in tokens {
        match token {
            Token::Literal(lit) => {
                rest = rest.strip_prefix(lit.as_str())?;
            }
            Token::Param(name) => {
                let end = segment_end(rest);
                params.push((Arc::clone(name), decode_segment(&rest[..end])));
                rest = &rest[end..];
            }
            Token::Wildcard => {
                rest = &rest[segment_end(rest)..];
            }
        }
    }

    // Both cursors must be exhausted: a shorter pattern never matches as a prefix
    rest.is_empty().then_some(params)
}

#[inline]
fn segment_end(s: &str) -> usize {
    s.find('/').unwrap_or(s.len())
}

fn decode_segment(raw: &str) -> String {
    if !raw.contains('%') {
        return raw.to_string();
    }
    match urlencoding::decode_binary(raw.as_bytes()) {
        Cow::Borrowed(b) => String::from_utf8_lossy(b).into_owned(),
        Cow::Owned(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let bytes = pattern.as_bytes();
    let mut tokens = Vec::new();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b':' | b'*' => {
                if literal_start < i {
                    tokens.push(Token::Literal(pattern[literal_start..i].to_string()));
                }
                let end = i + 1 + segment_end(&pattern[i + 1..]);
                if bytes[i] == b':' {
                    tokens.push(Token::Param(Arc::from(&pattern[i + 1..end])));
                } else {
                    tokens.push(Token::Wildcard);
                }
                i = end;
                literal_start = end;
            }
            _ => i += 1,
        }
    }
    if literal_start < bytes.len() {
        tokens.push(Token::Literal(pattern[literal_start..].to_string()));
    }
    tokens
}

/// Collapse runs of `/` into one and make sure the path starts with `/`
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        out.push('/');
    }
    let mut last_slash = false;
    for c in path.chars() {
        if c == '/' {
            if last_slash {
                continue;
            }
            last_slash = true;
        } else {
            last_slash = false;
        }
        out.push(c);
    }
    out
}

/// Mount roots are stored without a trailing slash; the server root is ""
fn trim_root(root: &str) -> String {
    let root = normalize_path(root.trim());
    root.trim_end_matches('/').to_string()
}

fn join_root(root: &str, pattern: &str) -> String {
    let pattern = pattern.trim();
    if root.is_empty() {
        return normalize_path(pattern);
    }
    if pattern.is_empty() || pattern == "/" {
        return root.to_string();
    }
    normalize_path(&format!("{root}/{pattern}"))
}
