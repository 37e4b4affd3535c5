//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    cache_info, cancel_job, clear_cache, download_processed_video, evict_job,
    get_processing_status, health, list_filters, list_jobs, list_processed_videos, mask_preview,
    process_video, stream_processed_video, video_proxy,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let rate_limiter = Arc::new(RateLimiterCache::new(state.config.rate_limit_rps));

    // Routes that start decoding work
    let work_routes = Router::new()
        .route("/process-video", post(process_video))
        .route("/mask-preview", post(mask_preview))
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let job_routes = Router::new()
        .route("/processing-status", get(list_jobs))
        .route(
            "/processing-status/:job_id",
            get(get_processing_status).delete(evict_job),
        )
        .route("/processing-status/:job_id/cancel", post(cancel_job));

    let video_routes = Router::new()
        .route("/processed-videos", get(list_processed_videos))
        .route("/processed-video/stream/:filename", get(stream_processed_video))
        .route("/processed-video/download/:filename", get(download_processed_video))
        .route("/video-proxy", get(video_proxy));

    let cache_routes = Router::new()
        .route("/cache/info", get(cache_info))
        .route("/cache/clear", post(clear_cache));

    let info_routes = Router::new()
        .route("/health", get(health))
        .route("/filters", get(list_filters));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(work_routes)
        .merge(job_routes)
        .merge(video_routes)
        .merge(cache_routes)
        .merge(info_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
