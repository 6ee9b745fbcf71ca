//! Version resolution: map a requested Kubernetes version to the upstream
//! release artifact that carries a compatible Weave Net manifest.

#![forbid(unsafe_code)]

use base64::Engine;
use regex::Regex;
use tracing::debug;

/// Release of the add-on whose artifacts we serve when nothing overrides it.
pub const DEFAULT_RELEASE: &str = "2.8.1";

/// Kubernetes minor versions that got their own manifest flavor, newest
/// first. Selection is first-match-wins over `threshold <= minor`, so the
/// order here must stay descending for the highest applicable entry to win.
const MINOR_THRESHOLDS: [u32; 5] = [11, 9, 8, 7, 6];

/// Fixed table mapping a Kubernetes `(major, minor)` to the source manifest
/// URL for one add-on release. Built once at process start; pure lookups.
#[derive(Debug, Clone)]
pub struct SourceTable {
    entries: Vec<(u32, String)>,
}

impl SourceTable {
    pub fn for_release(release: &str) -> Self {
        let entries = MINOR_THRESHOLDS
            .iter()
            .map(|n| {
                (
                    *n,
                    format!(
                        "https://github.com/weaveworks/weave/releases/download/v{}/weave-daemonset-k8s-1.{}.yaml",
                        release, n
                    ),
                )
            })
            .collect();
        Self { entries }
    }

    /// Select the source URL for a cluster version, or `None` when no
    /// compatible manifest exists. Only major `1` is supported.
    pub fn select(&self, major: &str, minor: u32) -> Option<&str> {
        if major != "1" {
            debug!(major = %major, "unsupported major version");
            return None;
        }
        self.entries
            .iter()
            .find(|(threshold, _)| *threshold <= minor)
            .map(|(_, url)| url.as_str())
    }
}

/// Parser for the base64-encoded `kubectl version` report clients embed in
/// the query string. Two textual shapes are recognized: the older
/// `version.Info{Major:"1", Minor:"13+", ...}` struct dump and the newer
/// `Server Version: v1.25.3` short form.
#[derive(Debug)]
pub struct ReportParser {
    old_format: Regex,
    new_format: Regex,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportParser {
    pub fn new() -> Self {
        // Minor may carry a provider suffix like "13+"; digits only count.
        let old_format =
            Regex::new(r#"Server Version: version\.Info\{Major:"(\d+)[^"]*", Minor:"(\d+)[^"]*""#)
                .unwrap();
        let new_format = Regex::new(r"Server Version:\s*v?(\d+)\.(\d+)").unwrap();
        Self {
            old_format,
            new_format,
        }
    }

    /// Decode and parse an encoded report into `(major, minor)`. Returns
    /// `None` on bad base64 or when neither report shape matches.
    pub fn parse_report(&self, encoded: &str) -> Option<(String, u32)> {
        let compact: Vec<u8> = encoded
            .bytes()
            .filter(|b| !b.is_ascii_whitespace())
            .collect();
        let decoded = match base64::engine::general_purpose::STANDARD.decode(&compact) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(error = %e, "version report is not valid base64");
                return None;
            }
        };
        let text = String::from_utf8_lossy(&decoded);
        for re in [&self.old_format, &self.new_format] {
            if let Some(caps) = re.captures(&text) {
                let major = caps[1].to_string();
                if let Ok(minor) = caps[2].parse::<u32>() {
                    return Some((major, minor));
                }
            }
        }
        debug!("version report matched no known format");
        None
    }
}

/// Parse an explicit `v<major>.<minor>` path segment (leading `v` optional).
pub fn parse_path_version(segment: &str) -> Option<(String, u32)> {
    let trimmed = segment.strip_prefix('v').unwrap_or(segment);
    let (major, minor) = trimmed.split_once('.')?;
    if major.is_empty() || !major.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let minor = minor.parse::<u32>().ok()?;
    Some((major.to_string(), minor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn encode(s: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(s)
    }

    #[test]
    fn selects_highest_applicable_threshold() {
        let table = SourceTable::for_release("2.8.1");
        let url = table.select("1", 28).expect("1.28 resolves");
        assert!(url.ends_with("v2.8.1/weave-daemonset-k8s-1.11.yaml"), "{url}");
        assert!(table.select("1", 9).unwrap().ends_with("k8s-1.9.yaml"));
        assert!(table.select("1", 10).unwrap().ends_with("k8s-1.9.yaml"));
        assert!(table.select("1", 6).unwrap().ends_with("k8s-1.6.yaml"));
    }

    #[test]
    fn selection_fails_below_table_and_off_major() {
        let table = SourceTable::for_release("2.8.1");
        assert_eq!(table.select("1", 5), None);
        assert_eq!(table.select("2", 28), None);
        assert_eq!(table.select("0", 11), None);
    }

    #[test]
    fn selection_is_monotonic_in_minor() {
        let table = SourceTable::for_release("2.8.1");
        let threshold_of = |minor: u32| -> u32 {
            let url = table.select("1", minor).unwrap();
            let tail = url.rsplit("k8s-1.").next().unwrap();
            tail.trim_end_matches(".yaml").parse().unwrap()
        };
        let mut prev = threshold_of(6);
        for minor in 7..=40 {
            let cur = threshold_of(minor);
            assert!(cur >= prev, "minor {minor}: {cur} < {prev}");
            prev = cur;
        }
    }

    #[test]
    fn parses_old_struct_dump_report() {
        let report = concat!(
            "Client Version: version.Info{Major:\"1\", Minor:\"13\", GitVersion:\"v1.13.2\"}\n",
            "Server Version: version.Info{Major:\"1\", Minor:\"13+\", ",
            "GitVersion:\"v1.13.12-gke.25\", GitCommit:\"654de8cac69f1fc5db6f2de0b88d6d027bc15828\"}\n",
        );
        let parser = ReportParser::new();
        assert_eq!(
            parser.parse_report(&encode(report)),
            Some(("1".to_string(), 13))
        );
    }

    #[test]
    fn parses_new_short_report() {
        let report = "Client Version: v1.28.2\nKustomize Version: v5.0.4\nServer Version: v1.25.3\n";
        let parser = ReportParser::new();
        assert_eq!(
            parser.parse_report(&encode(report)),
            Some(("1".to_string(), 25))
        );
    }

    #[test]
    fn tolerates_newlines_inside_base64() {
        let report = "Server Version: v1.22.1\n";
        let mut encoded = encode(report);
        encoded.insert(8, '\n');
        let parser = ReportParser::new();
        assert_eq!(
            parser.parse_report(&encoded),
            Some(("1".to_string(), 22))
        );
    }

    #[test]
    fn rejects_unknown_report_shapes() {
        let parser = ReportParser::new();
        assert_eq!(parser.parse_report(&encode("no version here")), None);
        assert_eq!(parser.parse_report("!!not-base64!!"), None);
        assert_eq!(parser.parse_report(&encode("Server Version: vX.Y.Z")), None);
    }

    #[test]
    fn path_version_accepts_plain_and_v_prefixed() {
        assert_eq!(parse_path_version("v1.28"), Some(("1".to_string(), 28)));
        assert_eq!(parse_path_version("1.9"), Some(("1".to_string(), 9)));
        assert_eq!(parse_path_version("v1"), None);
        assert_eq!(parse_path_version("v1.x"), None);
        assert_eq!(parse_path_version(""), None);
    }
}
