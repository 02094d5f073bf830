//! Release workflow API handlers
//!
//! Async triggers answer `204 No Content`; polls return the task as
//! `{success, data, exception}`.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    models::{TaskKind, TaskStateResponse, UploadEdits},
    services::PipelineError,
    AppState,
};

/// Body of the preview and archive-submission triggers
#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub file: String,
}

/// POST /releases/upload request
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub file: String,
    #[serde(flatten)]
    pub edits: UploadEdits,
}

/// POST /releases/commit request
#[derive(Debug, Deserialize)]
pub struct CommitRequest {
    pub file: String,
    #[serde(default)]
    pub page_content: String,
    #[serde(default)]
    pub index_record_body: String,
}

/// POST /releases/preview
pub async fn request_preview(
    State(state): State<AppState>,
    Json(request): Json<FileRequest>,
) -> ApiResult<StatusCode> {
    state.service.request_preview(&request.file).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /releases/preview/:file
pub async fn poll_preview(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Json<TaskStateResponse>> {
    let task = state.service.poll_preview(&file).await?;
    Ok(Json(task.to_response()))
}

/// POST /releases/upload
pub async fn request_upload(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> ApiResult<StatusCode> {
    state
        .service
        .request_upload(&request.file, request.edits.release_metadata)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /releases/upload/:file
pub async fn poll_upload(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Json<TaskStateResponse>> {
    let task = state.service.poll_upload(&file).await?;
    Ok(Json(task.to_response()))
}

/// POST /releases/commit
///
/// Returns the final Upload task, whose data now carries `release_id`.
pub async fn commit_release(
    State(state): State<AppState>,
    Json(request): Json<CommitRequest>,
) -> ApiResult<Json<TaskStateResponse>> {
    let task = state
        .service
        .commit_release(&request.file, &request.page_content, &request.index_record_body)
        .await?;
    Ok(Json(task.to_response()))
}

/// POST /releases/archive
pub async fn request_archive_submission(
    State(state): State<AppState>,
    Json(request): Json<FileRequest>,
) -> ApiResult<StatusCode> {
    state.service.request_archive_submission(&request.file).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /releases/archive/:file
pub async fn poll_archive_submission(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Json<TaskStateResponse>> {
    let task = state.service.poll_archive_submission(&file).await?;
    Ok(Json(task.to_response()))
}

/// DELETE /releases/tasks/:kind/:file
pub async fn discard_task(
    State(state): State<AppState>,
    Path((kind, file)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let kind: TaskKind = kind.parse().map_err(ApiError::BadRequest)?;
    state.service.discard_task(kind, &file).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /releases/:id
pub async fn delete_release(
    State(state): State<AppState>,
    Path(release_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state
        .service
        .delete_release(release_id)
        .await
        .map_err(|err| match err {
            PipelineError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::from(other),
        })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Build release workflow routes
pub fn release_routes() -> Router<AppState> {
    Router::new()
        .route("/releases/preview", post(request_preview))
        .route("/releases/preview/:file", get(poll_preview))
        .route("/releases/upload", post(request_upload))
        .route("/releases/upload/:file", get(poll_upload))
        .route("/releases/commit", post(commit_release))
        .route("/releases/archive", post(request_archive_submission))
        .route("/releases/archive/:file", get(poll_archive_submission))
        .route("/releases/tasks/:kind/:file", delete(discard_task))
        .route("/releases/:id", delete(delete_release))
}
