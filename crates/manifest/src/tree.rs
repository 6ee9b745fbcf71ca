//! Parsing and navigation of the manifest tree.
//!
//! The manifest is held as generic `serde_yaml::Value` nodes; `Mapping`
//! preserves insertion order, so untouched fields survive a parse/render
//! round trip in their original order. All deep field paths used by the
//! mutation engine are centralized here as accessors that answer `None`
//! for absent or wrong-shaped intermediates instead of panicking.

use serde::Deserialize;
use serde_yaml::{Mapping, Sequence, Value};
use tracing::debug;
use weavegen_core::ManifestError;

/// Parse a (possibly multi-document) YAML stream into its documents.
pub fn parse_documents(raw: &str) -> Result<Vec<Value>, ManifestError> {
    let mut docs = Vec::new();
    for de in serde_yaml::Deserializer::from_str(raw) {
        match Value::deserialize(de) {
            Ok(doc) => docs.push(doc),
            Err(e) => {
                debug!(error = %e, "manifest source failed to parse");
                return Err(ManifestError::Parse);
            }
        }
    }
    Ok(docs)
}

/// Locate the DaemonSet inside a resource-list document.
///
/// The document must be a mapping whose `items` key holds a sequence; the
/// target is the first mapping item with `kind: DaemonSet`. The returned
/// reference aliases into the document, so mutation through it is visible
/// when the document is rendered.
pub fn daemonset_mut(doc: &mut Value) -> Result<&mut Value, ManifestError> {
    let items = doc
        .get_mut("items")
        .and_then(Value::as_sequence_mut)
        .ok_or(ManifestError::ListMissing)?;
    items
        .iter_mut()
        .find(|item| item.get("kind").and_then(Value::as_str) == Some("DaemonSet"))
        .ok_or(ManifestError::TargetMissing)
}

fn pod_spec_mut(ds: &mut Value) -> Option<&mut Value> {
    ds.get_mut("spec")?.get_mut("template")?.get_mut("spec")
}

pub fn containers_mut(ds: &mut Value) -> Option<&mut Sequence> {
    pod_spec_mut(ds)?.get_mut("containers")?.as_sequence_mut()
}

pub fn init_containers_mut(ds: &mut Value) -> Option<&mut Sequence> {
    pod_spec_mut(ds)?.get_mut("initContainers")?.as_sequence_mut()
}

/// Env sequence of the first container, created when absent.
pub fn first_container_env_mut(ds: &mut Value) -> Option<&mut Sequence> {
    let container = containers_mut(ds)?.first_mut()?.as_mapping_mut()?;
    container
        .entry(Value::from("env"))
        .or_insert_with(|| Value::Sequence(Sequence::new()))
        .as_sequence_mut()
}

/// Pod-level `securityContext.seLinuxOptions` mapping, creating the
/// intermediate mappings when absent.
pub fn selinux_options_mut(ds: &mut Value) -> Option<&mut Mapping> {
    let pod = pod_spec_mut(ds)?.as_mapping_mut()?;
    pod.entry(Value::from("securityContext"))
        .or_insert_with(|| Value::Mapping(Mapping::new()))
        .as_mapping_mut()?
        .entry(Value::from("seLinuxOptions"))
        .or_insert_with(|| Value::Mapping(Mapping::new()))
        .as_mapping_mut()
}
