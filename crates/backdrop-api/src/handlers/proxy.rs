//! Pass-through fetch of remote videos, so browsers avoid CORS issues.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// Stream an external video through this server.
///
/// Only http(s) sources are fetched. A client `Range` header is forwarded
/// so players can seek.
pub async fn video_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let raw = query
        .url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("No video URL provided"))?;
    let url = Url::parse(raw).map_err(|e| ApiError::bad_request(format!("Invalid URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ApiError::bad_request("Only http and https URLs can be proxied"));
    }

    let mut upstream = state.http.get(url.clone());
    if let Some(range) = headers.get(header::RANGE) {
        upstream = upstream.header(header::RANGE, range.clone());
    }

    let upstream = upstream.send().await.map_err(|e| {
        warn!(url = %url, error = %e, "Proxy fetch failed");
        ApiError::bad_gateway(format!("Failed to fetch video: {}", e))
    })?;

    let status = upstream.status();
    metrics::record_proxy_request(status.as_u16());
    if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
        return Err(ApiError::bad_gateway(format!(
            "Failed to fetch video: {}",
            status.as_u16()
        )));
    }
    debug!(url = %url, status = status.as_u16(), "Proxying video");

    let content_type = upstream
        .headers()
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("video/mp4"));

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::ACCEPT_RANGES, "bytes");
    for name in [header::CONTENT_LENGTH, header::CONTENT_RANGE] {
        if let Some(value) = upstream.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| ApiError::internal(format!("Failed to build proxy response: {}", e)))
}
