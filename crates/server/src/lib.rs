//! HTTP surface: routes version-addressed manifest requests into the
//! resolve → fetch → customize pipeline and maps failures to responses.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{info, warn};
use weavegen_core::{ParamList, VERSION_REPORT_PARAM};
use weavegen_fetch::ManifestCache;
use weavegen_resolve::{parse_path_version, ReportParser, SourceTable};

pub const YAML_CONTENT_TYPE: &str = "application/x-yaml";

/// Shared per-process services, built once in `main` and injected into
/// handlers. Tests construct this with a seeded cache.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ManifestCache>,
    pub table: Arc<SourceTable>,
    pub reports: Arc<ReportParser>,
}

impl AppState {
    pub fn new(release: &str) -> Self {
        Self::with_cache(release, ManifestCache::new())
    }

    pub fn with_cache(release: &str, cache: ManifestCache) -> Self {
        Self {
            cache: Arc::new(cache),
            table: Arc::new(SourceTable::for_release(release)),
            reports: Arc::new(ReportParser::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/k8s/net", get(net_from_report))
        .route("/k8s/:version/net.yaml", get(net_from_path))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    body: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        status: "error",
        body: message.into(),
    };
    (status, Json(body)).into_response()
}

/// `GET /k8s/net?k8s-version=<base64 kubectl version report>`
async fn net_from_report(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Response {
    let mut params = ParamList::parse(raw.as_deref().unwrap_or(""));
    let encoded = params.strip(VERSION_REPORT_PARAM);
    let resolved = encoded
        .as_deref()
        .and_then(|e| state.reports.parse_report(e));
    let Some((major, minor)) = resolved else {
        counter!("manifest_resolve_miss", 1u64);
        return error_response(
            StatusCode::NOT_FOUND,
            "could not determine kubernetes version",
        );
    };
    serve_manifest(&state, &major, minor, &params).await
}

/// `GET /k8s/v<major>.<minor>/net.yaml`
async fn net_from_path(
    State(state): State<AppState>,
    Path(version): Path<String>,
    RawQuery(raw): RawQuery,
) -> Response {
    let mut params = ParamList::parse(raw.as_deref().unwrap_or(""));
    // Reserved for resolution; never reaches the mutation pass.
    params.strip(VERSION_REPORT_PARAM);
    let Some((major, minor)) = parse_path_version(&version) else {
        counter!("manifest_resolve_miss", 1u64);
        return error_response(StatusCode::NOT_FOUND, "unrecognized version segment");
    };
    serve_manifest(&state, &major, minor, &params).await
}

async fn serve_manifest(
    state: &AppState,
    major: &str,
    minor: u32,
    params: &ParamList,
) -> Response {
    let t0 = Instant::now();
    counter!("manifest_requests", 1u64);
    let Some(url) = state.table.select(major, minor) else {
        counter!("manifest_resolve_miss", 1u64);
        return error_response(StatusCode::NOT_FOUND, "no compatible source found");
    };
    info!(major = %major, minor, url = %url, directives = params.len(), "serving manifest");
    let raw = match state.cache.fetch(url).await {
        Ok(body) => body,
        Err(e) => {
            warn!(url = %url, error = %e, "upstream fetch failed");
            return error_response(StatusCode::BAD_GATEWAY, e.to_string());
        }
    };
    match weavegen_manifest::customize(&raw, params) {
        Ok(yaml) => {
            histogram!("manifest_latency_ms", t0.elapsed().as_secs_f64() * 1000.0);
            (
                [(header::CONTENT_TYPE, YAML_CONTENT_TYPE)],
                yaml,
            )
                .into_response()
        }
        Err(e) => {
            counter!("manifest_pipeline_err", 1u64);
            warn!(url = %url, error = %e, "manifest pipeline failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
