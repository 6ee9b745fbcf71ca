//! Fetch-once cache of upstream manifest text, keyed by source URL.

#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use metrics::counter;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Process-lifetime cache of raw manifest bodies. Constructed once and
/// passed to request handlers; tests inject a pre-seeded instance.
///
/// Published release artifacts are immutable, so entries are never evicted
/// or refreshed. Two concurrent misses for the same URL may both fetch and
/// both insert; the overwrite is idempotent.
pub struct ManifestCache {
    http: reqwest::Client,
    entries: RwLock<HashMap<String, Arc<str>>>,
}

impl Default for ManifestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestCache {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cache pre-populated with `(url, body)` pairs; no network happens for
    /// seeded URLs.
    pub fn seeded<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Arc<str>>,
    {
        let entries = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            http: reqwest::Client::new(),
            entries: RwLock::new(entries),
        }
    }

    /// Return the body for `url`, fetching it on first use.
    ///
    /// Only a success status populates the cache; an error body is still
    /// handed to the caller for this one request so the response can carry
    /// whatever upstream said, without poisoning later requests. Transport
    /// failures propagate and cache nothing.
    pub async fn fetch(&self, url: &str) -> Result<Arc<str>> {
        if let Some(body) = self.entries.read().await.get(url).cloned() {
            counter!("manifest_cache_hits", 1u64);
            return Ok(body);
        }
        counter!("manifest_cache_misses", 1u64);
        info!(url = %url, "fetching upstream manifest");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetching {url}"))?;
        let status = resp.status();
        let body: Arc<str> = resp
            .text()
            .await
            .with_context(|| format!("reading body from {url}"))?
            .into();
        if status.is_success() {
            self.entries
                .write()
                .await
                .insert(url.to_string(), body.clone());
        } else {
            counter!("manifest_fetch_err", 1u64);
            warn!(url = %url, status = %status, "upstream returned non-success; not caching");
        }
        Ok(body)
    }

    /// Number of cached sources (test hook).
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
