//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "backdrop_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "backdrop_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "backdrop_http_requests_in_flight";

    pub const JOBS_ACTIVE: &str = "backdrop_jobs_active";
    pub const CACHE_ENTRIES: &str = "backdrop_cache_entries";
    pub const PROXY_REQUESTS_TOTAL: &str = "backdrop_proxy_requests_total";

    pub const RATE_LIMIT_HITS_TOTAL: &str = "backdrop_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn set_active_jobs(count: usize) {
    gauge!(names::JOBS_ACTIVE).set(count as f64);
}

pub fn set_cache_entries(count: usize) {
    gauge!(names::CACHE_ENTRIES).set(count as f64);
}

pub fn record_proxy_request(upstream_status: u16) {
    let labels = [("status", upstream_status.to_string())];
    counter!(names::PROXY_REQUESTS_TOTAL, &labels).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse job ids and artifact names so labels stay bounded.
fn sanitize_path(path: &str) -> String {
    const PARAM_PREFIXES: [(&str, &str); 3] = [
        ("/processing-status/", ":job_id"),
        ("/processed-video/stream/", ":filename"),
        ("/processed-video/download/", ":filename"),
    ];

    for (prefix, placeholder) in PARAM_PREFIXES {
        if let Some(rest) = path.strip_prefix(prefix) {
            return match rest.split_once('/') {
                Some((_, tail)) => format!("{}{}/{}", prefix, placeholder, tail),
                None => format!("{}{}", prefix, placeholder),
            };
        }
    }
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}
