//! Cache administration.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::info;

use backdrop_models::format_bytes;

use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfoResponse {
    pub count: usize,
    pub total_bytes: u64,
    /// Human-readable total size
    pub total_size: String,
}

/// Number of cached results and their total size.
pub async fn cache_info(State(state): State<AppState>) -> Json<CacheInfoResponse> {
    let stats = state.cache.stats().await;
    metrics::set_cache_entries(stats.count);
    Json(CacheInfoResponse {
        count: stats.count,
        total_bytes: stats.total_bytes,
        total_size: format_bytes(stats.total_bytes),
    })
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub removed: usize,
}

/// Drop every cached result and its artifact.
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<Json<ClearCacheResponse>> {
    let removed = state.cache.clear().await?;
    metrics::set_cache_entries(0);
    info!(removed, "Cache cleared via API");
    Ok(Json(ClearCacheResponse {
        message: "Cache cleared successfully".to_string(),
        removed,
    }))
}
