//! Manifest resolution core: parse the upstream YAML, locate the DaemonSet,
//! apply query-driven mutations, and render the result.

#![forbid(unsafe_code)]

pub mod mutate;
pub mod tree;

use serde_yaml::Value;
use tracing::error;
use weavegen_core::{ManifestError, ParamList};

pub use mutate::{apply_directives, Directive};

/// Render one document back to YAML text.
pub fn render(doc: &Value) -> Result<String, ManifestError> {
    serde_yaml::to_string(doc).map_err(|e| {
        // A tree we just parsed should always serialize; treat the stream as
        // unreadable if it does not.
        error!(error = %e, "failed to render manifest");
        ManifestError::Parse
    })
}

/// Full pipeline for one request: parse the raw source, locate the DaemonSet
/// in the first document, mutate it per `params`, and serialize that first
/// document. Trailing documents of a multi-document source are dropped.
pub fn customize(raw: &str, params: &ParamList) -> Result<String, ManifestError> {
    let docs = tree::parse_documents(raw)?;
    let mut first = docs.into_iter().next().ok_or(ManifestError::ListMissing)?;
    let target = tree::daemonset_mut(&mut first)?;
    mutate::apply_directives(target, params);
    render(&first)
}
