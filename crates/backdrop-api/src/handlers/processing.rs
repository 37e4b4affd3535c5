//! Job creation, status, cancellation and eviction.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use backdrop_models::{Effect, JobErrorKind, JobId, JobSnapshot, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Upper bound on accepted source references.
const MAX_SOURCE_LEN: usize = 4096;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoRequest {
    pub video_url: Option<String>,
    pub filter_type: Option<String>,
}

impl ProcessVideoRequest {
    /// Source and effect, or a message describing what is wrong.
    pub fn validate(&self) -> Result<(String, Effect), String> {
        let source = self
            .video_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "No video URL provided".to_string())?;
        if source.len() > MAX_SOURCE_LEN {
            return Err("Video URL is too long".to_string());
        }

        let effect = match self.filter_type.as_deref() {
            None => Effect::default(),
            Some(tag) => tag
                .parse::<Effect>()
                .map_err(|e| format!("{}; expected one of grayscale, sepia, blur", e))?,
        };
        Ok((source.to_string(), effect))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessVideoResponse {
    pub message: String,
    pub job_id: JobId,
    pub filter_type: Effect,
}

/// Start processing a whole video.
pub async fn process_video(
    State(state): State<AppState>,
    Json(request): Json<ProcessVideoRequest>,
) -> ApiResult<(StatusCode, Json<ProcessVideoResponse>)> {
    let (source, effect) = request.validate().map_err(ApiError::bad_request)?;
    let job_id = state.jobs.submit(&source, effect).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(ProcessVideoResponse {
            message: "Video processing started".to_string(),
            job_id,
            filter_type: effect,
        }),
    ))
}

/// Status body for one job.
///
/// Mixed casing matches what existing clients read.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub processed_frames: u64,
    pub total_frames: u64,
    #[serde(rename = "filterType")]
    pub filter_type: Effect,
    #[serde(rename = "videoUrl")]
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<JobErrorKind>,
    pub cached: bool,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl From<JobSnapshot> for StatusResponse {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            progress: snapshot.progress(),
            job_id: snapshot.job_id,
            status: snapshot.status,
            processed_frames: snapshot.processed_frames,
            total_frames: snapshot.total_frames,
            filter_type: snapshot.effect,
            video_url: snapshot.source,
            filename: snapshot.filename,
            error: snapshot.error,
            error_kind: snapshot.error_kind,
            cached: snapshot.cached,
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
        }
    }
}

/// Poll a job.
pub async fn get_processing_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    state
        .jobs
        .status(&JobId::from_string(job_id))
        .map(|snapshot| Json(snapshot.into()))
        .ok_or_else(|| ApiError::not_found("Job not found"))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: JobId,
    /// False when the job had already finished
    pub cancelled: bool,
}

/// Ask a job to stop.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let job_id = JobId::from_string(job_id);
    if state.jobs.status(&job_id).is_none() {
        return Err(ApiError::not_found("Job not found"));
    }
    let cancelled = state.jobs.cancel(&job_id);
    Ok(Json(CancelResponse { job_id, cancelled }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictResponse {
    pub job_id: JobId,
    pub evicted: bool,
}

/// Remove a finished job from the registry.
pub async fn evict_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<EvictResponse>> {
    let job_id = JobId::from_string(job_id);
    if !state.jobs.evict(&job_id)? {
        return Err(ApiError::not_found("Job not found"));
    }
    Ok(Json(EvictResponse {
        job_id,
        evicted: true,
    }))
}

/// All jobs known to this process.
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<StatusResponse>> {
    Json(state.jobs.list().into_iter().map(StatusResponse::from).collect())
}
