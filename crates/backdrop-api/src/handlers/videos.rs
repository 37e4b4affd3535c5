//! Processed video listing and delivery.

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use backdrop_models::{format_bytes, Effect};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedVideo {
    pub filename: String,
    pub size: u64,
    pub size_formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_type: Option<Effect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    pub cached: bool,
    pub download_url: String,
    pub stream_url: String,
}

#[derive(Serialize)]
pub struct ProcessedVideosResponse {
    pub videos: Vec<ProcessedVideo>,
}

/// Video files in the output directory, newest first.
pub async fn list_processed_videos(
    State(state): State<AppState>,
) -> ApiResult<Json<ProcessedVideosResponse>> {
    let videos = state
        .cache
        .list_artifacts()
        .await?
        .into_iter()
        .map(|a| ProcessedVideo {
            download_url: format!("/processed-video/download/{}", a.filename),
            stream_url: format!("/processed-video/stream/{}", a.filename),
            size_formatted: format_bytes(a.size_bytes),
            size: a.size_bytes,
            filter_type: a.effect,
            modified: a.modified,
            cached: a.cached,
            filename: a.filename,
        })
        .collect();
    Ok(Json(ProcessedVideosResponse { videos }))
}

/// Inline playback, with Range support.
pub async fn stream_processed_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let mut response = serve_artifact(&state, &filename, request).await?;
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=3600"),
    );
    response.headers_mut().insert(
        "cross-origin-resource-policy",
        HeaderValue::from_static("cross-origin"),
    );
    Ok(response)
}

/// Same bytes as streaming, offered as an attachment.
pub async fn download_processed_video(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    request: Request,
) -> ApiResult<Response> {
    let mut response = serve_artifact(&state, &filename, request).await?;
    let disposition = format!("attachment; filename=\"{}\"", filename);
    let value = HeaderValue::from_str(&disposition)
        .map_err(|_| ApiError::bad_request("Invalid filename"))?;
    response
        .headers_mut()
        .insert(header::CONTENT_DISPOSITION, value);
    Ok(response)
}

async fn serve_artifact(state: &AppState, filename: &str, request: Request) -> ApiResult<Response> {
    let path = state.cache.artifact_path(filename).await?;
    let response = ServeFile::new(&path)
        .oneshot(request)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to serve {}: {}", filename, e)))?;
    Ok(response.map(Body::new))
}
