//! Weavegen core types: ordered query parameters and pipeline errors.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Reserved query parameter carrying the base64 `kubectl version` report.
/// Consumed by version resolution and stripped before mutation.
pub const VERSION_REPORT_PARAM: &str = "k8s-version";

/// Errors surfaced by the parse/locate stages of the manifest pipeline.
///
/// Mutation directives never produce errors; bad directives degrade to
/// logged no-ops. Variant messages are part of the response contract.
#[derive(Debug, thiserror::Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum ManifestError {
    #[error("could not read structured data from source")]
    Parse,
    #[error("list not found")]
    ListMissing,
    #[error("daemonset not found")]
    TargetMissing,
}

/// Query parameters as an ordered sequence of decoded `(key, value)` pairs.
///
/// Order is arrival order and duplicates are kept; directive application is
/// strictly left-to-right, so a deduplicating map would change semantics
/// (last-write-wins for env vars, and container removal is order-dependent
/// relative to retagging).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamList {
    pairs: Vec<(String, String)>,
}

impl ParamList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw (still percent-encoded) query string. A key with no `=`
    /// decodes to an empty value.
    pub fn parse(raw_query: &str) -> Self {
        let pairs = url::form_urlencoded::parse(raw_query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// Remove every occurrence of `key`, returning the first removed value.
    pub fn strip(&mut self, key: &str) -> Option<String> {
        let first = self
            .pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone());
        self.pairs.retain(|(k, _)| k != key);
        first
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
