//! Mask preview for a single frame.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::debug;

use backdrop_media::{jpeg_data_url, overlay_mask, Detections, MediaResult};
use backdrop_models::Region;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskPreviewRequest {
    pub video_url: Option<String>,
    #[serde(default)]
    pub frame_number: u64,
}

#[derive(Serialize)]
pub struct DetectionSummary {
    pub faces: Vec<Region>,
    pub bodies: Vec<Region>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskPreviewResponse {
    /// JPEG data URL of the frame with the person tinted green.
    pub preview: String,
    pub frame_number: u64,
    pub detections: DetectionSummary,
}

/// Show which part of a frame would be kept as foreground.
pub async fn mask_preview(
    State(state): State<AppState>,
    Json(request): Json<MaskPreviewRequest>,
) -> ApiResult<Json<MaskPreviewResponse>> {
    let source = request
        .video_url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("No video URL provided"))?;

    let info = state.backend.probe(source).await.map_err(|e| {
        debug!(source, error = %e, "Preview probe failed");
        ApiError::bad_request("Could not open video")
    })?;
    let frame = state
        .backend
        .frame_at(source, &info, request.frame_number)
        .await
        .map_err(|e| {
            debug!(source, frame = request.frame_number, error = %e, "Preview frame read failed");
            ApiError::bad_request("Could not read frame")
        })?;

    let pipeline = state.pipeline.clone();
    let (preview, detections) = tokio::task::spawn_blocking(move || -> MediaResult<(String, Detections)> {
        let (mask, detections) = pipeline.mask_for(&frame)?;
        let tinted = overlay_mask(&frame, &mask);
        jpeg_data_url(&tinted).map(|url| (url, detections))
    })
    .await
    .map_err(|e| ApiError::internal(format!("Preview task failed: {}", e)))?
    .map_err(|e| ApiError::internal(format!("Preview failed: {}", e)))?;

    Ok(Json(MaskPreviewResponse {
        preview,
        frame_number: request.frame_number,
        detections: DetectionSummary {
            faces: detections.faces,
            bodies: detections.bodies,
        },
    }))
}
