#![forbid(unsafe_code)]

use serde_yaml::Value;
use weavegen_core::{ManifestError, ParamList};
use weavegen_manifest::customize;

const FIXTURE: &str = include_str!("fixtures/weave-daemonset.yaml");

fn run(query: &str) -> Value {
    let out = customize(FIXTURE, &ParamList::parse(query)).unwrap();
    serde_yaml::from_str(&out).unwrap()
}

fn daemonset(doc: &Value) -> &Value {
    doc.get("items")
        .and_then(Value::as_sequence)
        .unwrap()
        .iter()
        .find(|i| i.get("kind").and_then(Value::as_str) == Some("DaemonSet"))
        .unwrap()
}

fn containers(doc: &Value) -> &serde_yaml::Sequence {
    daemonset(doc)
        .get("spec")
        .and_then(|s| s.get("template"))
        .and_then(|t| t.get("spec"))
        .and_then(|s| s.get("containers"))
        .and_then(Value::as_sequence)
        .unwrap()
}

fn weave_env(doc: &Value) -> &serde_yaml::Sequence {
    containers(doc)[0]
        .get("env")
        .and_then(Value::as_sequence)
        .unwrap()
}

fn env_entry<'a>(doc: &'a Value, name: &str) -> Option<&'a Value> {
    weave_env(doc)
        .iter()
        .find(|e| e.get("name").and_then(Value::as_str) == Some(name))
}

#[test]
fn no_directives_round_trips_the_document() {
    let original: Value = serde_yaml::from_str(FIXTURE).unwrap();
    let reparsed = run("");
    assert_eq!(reparsed, original, "untouched fields must survive rendering");

    // And the serializer's own output must re-render identically.
    let once = customize(FIXTURE, &ParamList::new()).unwrap();
    let twice = customize(&once, &ParamList::new()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn env_directive_upserts_once_even_when_repeated() {
    let doc = run("env.WEAVE_MTU=1337&env.WEAVE_MTU=1337");
    let matches: Vec<_> = weave_env(&doc)
        .iter()
        .filter(|e| e.get("name").and_then(Value::as_str) == Some("WEAVE_MTU"))
        .collect();
    assert_eq!(matches.len(), 1);
    assert_eq!(
        matches[0].get("value").and_then(Value::as_str),
        Some("1337")
    );
}

#[test]
fn allow_list_blocks_unknown_env_names() {
    let doc = run("env.UNKNOWN_VAR=x");
    assert!(env_entry(&doc, "UNKNOWN_VAR").is_none());
}

#[test]
fn disable_npc_drops_the_npc_container() {
    let doc = run("disable-npc=true");
    let names: Vec<_> = containers(&doc)
        .iter()
        .filter_map(|c| c.get("name").and_then(Value::as_str))
        .collect();
    assert_eq!(names, vec!["weave"]);
    let npc = env_entry(&doc, "EXPECT_NPC").expect("EXPECT_NPC must be forced");
    assert_eq!(npc.get("value").and_then(Value::as_str), Some("0"));
}

#[test]
fn password_secret_replaces_any_plain_value() {
    let doc = run("password-secret=mysecret");
    let pw = env_entry(&doc, "WEAVE_PASSWORD").unwrap();
    assert!(pw.get("value").is_none());
    let secret = pw
        .get("valueFrom")
        .and_then(|v| v.get("secretKeyRef"))
        .unwrap();
    assert_eq!(secret.get("name").and_then(Value::as_str), Some("mysecret"));
    assert_eq!(secret.get("key").and_then(Value::as_str), Some("mysecret"));
}

#[test]
fn version_retags_all_present_images() {
    let doc = run("version=2.8.2");
    assert_eq!(
        containers(&doc)[0].get("image").and_then(Value::as_str),
        Some("weaveworks/weave-kube:2.8.2")
    );
    assert_eq!(
        containers(&doc)[1].get("image").and_then(Value::as_str),
        Some("weaveworks/weave-npc:2.8.2")
    );
    let init = daemonset(&doc)
        .get("spec")
        .and_then(|s| s.get("template"))
        .and_then(|t| t.get("spec"))
        .and_then(|s| s.get("initContainers"))
        .and_then(Value::as_sequence)
        .unwrap();
    assert_eq!(
        init[0].get("image").and_then(Value::as_str),
        Some("weaveworks/weave-kube:2.8.2")
    );
}

#[test]
fn selinux_directive_writes_through() {
    let doc = run("seLinuxOptions.type=spc_t");
    let opts = daemonset(&doc)
        .get("spec")
        .and_then(|s| s.get("template"))
        .and_then(|t| t.get("spec"))
        .and_then(|s| s.get("securityContext"))
        .and_then(|s| s.get("seLinuxOptions"))
        .unwrap();
    assert_eq!(opts.get("type").and_then(Value::as_str), Some("spc_t"));
}

#[test]
fn trailing_documents_are_dropped_from_output() {
    let source = format!("{FIXTURE}---\nkind: ConfigMap\nmetadata:\n  name: extra\n");
    let out = customize(&source, &ParamList::new()).unwrap();
    assert!(!out.contains("ConfigMap"), "{out}");
    let reparsed: Value = serde_yaml::from_str(&out).unwrap();
    assert_eq!(
        reparsed.get("kind").and_then(Value::as_str),
        Some("List")
    );
}

#[test]
fn malformed_source_yields_the_parse_error() {
    let err = customize("items: [oops", &ParamList::new()).unwrap_err();
    assert_eq!(err, ManifestError::Parse);
    assert_eq!(err.to_string(), "could not read structured data from source");
}

#[test]
fn missing_list_and_missing_target_are_distinct_errors() {
    assert_eq!(
        customize("", &ParamList::new()).unwrap_err(),
        ManifestError::ListMissing
    );
    assert_eq!(
        customize("kind: List\n", &ParamList::new()).unwrap_err(),
        ManifestError::ListMissing
    );
    assert_eq!(
        customize("items:\n- kind: ServiceAccount\n", &ParamList::new()).unwrap_err(),
        ManifestError::TargetMissing
    );
}
