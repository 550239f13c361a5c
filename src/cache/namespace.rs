//! Key namespacing between logical cache keys and raw backend keys.

/// Fixed prefix separating cache-owned backend keys from everything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Namespace {
    prefix: String,
}

impl Namespace {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Backend key for a logical key.
    pub(crate) fn raw_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Logical key for a backend key, or None if it lies outside the namespace.
    pub(crate) fn logical_key<'a>(&self, raw_key: &'a str) -> Option<&'a str> {
        raw_key.strip_prefix(self.prefix.as_str())
    }
}
