use crate::router::RouteEntry;

/// Ordered bucket of route entries, walked front to back on every pass
#[derive(Debug, Default, Clone)]
pub struct FilterLayer {
    entries: Vec<RouteEntry>,
}

impl FilterLayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: RouteEntry) {
        self.entries.push(entry);
    }

    /// Append every entry of `other`, keeping its order
    pub fn append(&mut self, other: FilterLayer) {
        self.entries.extend(other.entries);
    }

    /// Move every entry under a mount root
    #[must_use]
    pub fn rooted(self, root: &str) -> Self {
        Self {
            entries: self
                .entries
                .into_iter()
                .map(|e| e.with_root(root))
                .collect(),
        }
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
