//! Query-parameter-driven mutations of the DaemonSet.
//!
//! Directives are applied strictly left to right in request order; a bad
//! directive degrades to a logged no-op and never aborts the pipeline.

use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};
use weavegen_core::ParamList;

use crate::tree;

const ENV_PREFIX: &str = "env.";
const SELINUX_PREFIX: &str = "seLinuxOptions.";

const NPC_CONTAINER: &str = "weave-npc";
const EXPECT_NPC_VAR: &str = "EXPECT_NPC";
const PASSWORD_VAR: &str = "WEAVE_PASSWORD";

/// Environment variables settable through `env.<NAME>` directives. Closed
/// set; extending it is a deliberate change, not a passthrough.
const ENV_ALLOW_LIST: [&str; 12] = [
    "CHECKPOINT_DISABLE",
    "CONN_LIMIT",
    "EXPECT_NPC",
    "HAIRPIN_MODE",
    "IPALLOC_INIT",
    "IPALLOC_RANGE",
    "IPTABLES_BACKEND",
    "NO_MASQ_LOCAL",
    "WEAVE_EXPOSE_IP",
    "WEAVE_METRICS_ADDR",
    "WEAVE_MTU",
    "WEAVE_STATUS_ADDR",
];

/// One recognized mutation instruction. A closed enumeration: anything the
/// dispatch below does not name classifies as `Unknown` and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'a> {
    Env { name: &'a str, value: &'a str },
    SeLinuxOption { name: &'a str, value: &'a str },
    Version(&'a str),
    DisableNpc(&'a str),
    PasswordSecret(&'a str),
    Unknown(&'a str),
}

impl<'a> Directive<'a> {
    /// Classify a `(key, value)` pair. Prefix matches are tried before the
    /// named dispatch; first match wins and the categories are mutually
    /// exclusive.
    pub fn classify(key: &'a str, value: &'a str) -> Self {
        if let Some(name) = key.strip_prefix(ENV_PREFIX) {
            Directive::Env { name, value }
        } else if let Some(name) = key.strip_prefix(SELINUX_PREFIX) {
            Directive::SeLinuxOption { name, value }
        } else {
            match key {
                "version" => Directive::Version(value),
                "disable-npc" => Directive::DisableNpc(value),
                "password-secret" => Directive::PasswordSecret(value),
                other => Directive::Unknown(other),
            }
        }
    }
}

/// Value side of an env-var upsert: inline string or secret indirection.
#[derive(Debug, Clone, Copy)]
enum EnvValue<'a> {
    Plain(&'a str),
    Secret { name: &'a str, key: &'a str },
}

/// Apply every directive in arrival order. Never fails.
pub fn apply_directives(target: &mut Value, params: &ParamList) {
    for (key, value) in params.iter() {
        match Directive::classify(key, value) {
            Directive::Env { name, value } => {
                if ENV_ALLOW_LIST.contains(&name) {
                    upsert_env(target, name, EnvValue::Plain(value));
                } else {
                    warn!(name = %name, "env directive not in allow-list; dropping");
                }
            }
            Directive::SeLinuxOption { name, value } => set_selinux_option(target, name, value),
            Directive::Version(tag) => retag_images(target, tag),
            Directive::DisableNpc(v) => {
                if v == "true" {
                    disable_npc(target);
                } else {
                    debug!(value = %v, "disable-npc requires exact value \"true\"; ignoring");
                }
            }
            Directive::PasswordSecret(secret) => {
                if secret.is_empty() {
                    debug!("password-secret with empty value; ignoring");
                } else {
                    upsert_env(
                        target,
                        PASSWORD_VAR,
                        EnvValue::Secret {
                            name: secret,
                            key: secret,
                        },
                    );
                }
            }
            Directive::Unknown(key) => warn!(key = %key, "unrecognized directive; dropping"),
        }
    }
}

/// Insert-or-update an env var on the first container, preserving arrival
/// order for new entries. `value` and `valueFrom` are mutually exclusive:
/// writing one clears the other. Idempotent.
fn upsert_env(target: &mut Value, name: &str, value: EnvValue<'_>) {
    let Some(env) = tree::first_container_env_mut(target) else {
        warn!(name = %name, "no container env to mutate; dropping env upsert");
        return;
    };
    let existing = env
        .iter()
        .position(|e| e.get("name").and_then(Value::as_str) == Some(name));
    match existing {
        Some(i) => {
            let Some(entry) = env[i].as_mapping_mut() else {
                return;
            };
            write_env_value(entry, value);
        }
        None => {
            let mut entry = Mapping::new();
            entry.insert(Value::from("name"), Value::from(name));
            write_env_value(&mut entry, value);
            env.push(Value::Mapping(entry));
        }
    }
}

fn write_env_value(entry: &mut Mapping, value: EnvValue<'_>) {
    match value {
        EnvValue::Plain(v) => {
            entry.remove("valueFrom");
            entry.insert(Value::from("value"), Value::from(v));
        }
        EnvValue::Secret { name, key } => {
            entry.remove("value");
            entry.insert(Value::from("valueFrom"), secret_key_ref(name, key));
        }
    }
}

fn secret_key_ref(name: &str, key: &str) -> Value {
    let mut secret = Mapping::new();
    secret.insert(Value::from("name"), Value::from(name));
    secret.insert(Value::from("key"), Value::from(key));
    let mut value_from = Mapping::new();
    value_from.insert(Value::from("secretKeyRef"), Value::Mapping(secret));
    Value::Mapping(value_from)
}

fn set_selinux_option(target: &mut Value, name: &str, value: &str) {
    match tree::selinux_options_mut(target) {
        Some(opts) => {
            opts.insert(Value::from(name), Value::from(value));
        }
        None => warn!(name = %name, "pod spec missing; dropping seLinuxOptions directive"),
    }
}

/// Replace the image tag of the first init container (when present), the
/// first container, and the second container (when still present — an
/// earlier `disable-npc` may have removed it).
fn retag_images(target: &mut Value, tag: &str) {
    if let Some(inits) = tree::init_containers_mut(target) {
        if let Some(c) = inits.first_mut() {
            retag_container(c, tag);
        }
    }
    match tree::containers_mut(target) {
        Some(containers) if !containers.is_empty() => {
            for c in containers.iter_mut().take(2) {
                retag_container(c, tag);
            }
        }
        _ => warn!("no containers to retag; dropping version directive"),
    }
}

fn retag_container(container: &mut Value, tag: &str) {
    let Some(m) = container.as_mapping_mut() else {
        return;
    };
    // Suffix substitution of the final `:...` segment; untagged refs stay.
    let retagged = m
        .get("image")
        .and_then(Value::as_str)
        .and_then(|image| image.rsplit_once(':'))
        .map(|(repo, _)| format!("{repo}:{tag}"));
    if let Some(image) = retagged {
        m.insert(Value::from("image"), Value::from(image));
    }
}

/// Force `EXPECT_NPC=0` (internal upsert, allow-list not consulted) and drop
/// the first container named `weave-npc`.
fn disable_npc(target: &mut Value) {
    upsert_env(target, EXPECT_NPC_VAR, EnvValue::Plain("0"));
    if let Some(containers) = tree::containers_mut(target) {
        if let Some(i) = containers
            .iter()
            .position(|c| c.get("name").and_then(Value::as_str) == Some(NPC_CONTAINER))
        {
            containers.remove(i);
        }
    }
}
