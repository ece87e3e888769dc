//! HTTP handlers for the merge workspace

use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::error::PipelineError;
use crate::models::{
    HealthResponse, MergeRequest, MergeResponse, RemoveRequest, SessionId, SessionState,
    SuccessResponse, UploadedItem,
};
use crate::state::AppState;

/// Name of the multipart field carrying the upload
pub const UPLOAD_FIELD: &str = "file";

const INLINE: &str = "inline";
const ATTACHMENT: &str = "attachment; filename=\"merged.pdf\"";

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "pdfmerge-server",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Store one uploaded file, converting it to PDF when needed
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    mut multipart: Multipart,
) -> Result<Json<UploadedItem>, PipelineError> {
    let limit = state.pipeline.max_upload_bytes();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;

        let item = state.pipeline.upload(session, &filename, &bytes).await?;
        return Ok(Json(item));
    }

    Err(PipelineError::InvalidRequest("No file provided".into()))
}

/// Delete an uploaded item
pub async fn remove_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    body: Result<Json<RemoveRequest>, JsonRejection>,
) -> Result<Json<SuccessResponse>, PipelineError> {
    let Json(req) = body.map_err(json_error)?;
    let id = req
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| PipelineError::InvalidRequest("No file ID provided".into()))?;

    state.pipeline.remove(session, &id).await;
    Ok(Json(SuccessResponse::ok()))
}

/// Merge items in the order given
pub async fn merge_files(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    body: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<Json<MergeResponse>, PipelineError> {
    let Json(req) = body.map_err(json_error)?;
    let result = state
        .pipeline
        .merge(session, &req.files, &req.password, req.protect)
        .await?;
    Ok(Json(result.into()))
}

/// Show an item or the merge result without consuming it
pub async fn preview_file(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
    Path(file_id): Path<String>,
) -> Result<Response, PipelineError> {
    let bytes = state.pipeline.preview(session, &file_id).await?;
    Ok(pdf_response(bytes, INLINE))
}

/// Hand out the merge result; the session is purged afterwards
pub async fn download_merged(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Result<Response, PipelineError> {
    let (_, bytes) = state.pipeline.download(session).await?;
    Ok(pdf_response(bytes, ATTACHMENT))
}

/// Drop everything the session holds
pub async fn clear_session(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Json<SuccessResponse> {
    state.pipeline.clear(session).await;
    Json(SuccessResponse::ok())
}

/// Where the session stands
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionId>,
) -> Json<SessionState> {
    Json(state.pipeline.status(session).await)
}

fn pdf_response(bytes: Vec<u8>, disposition: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-store"),
        ],
        bytes,
    )
        .into_response()
}

fn multipart_error(err: MultipartError, limit: usize) -> PipelineError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PipelineError::PayloadTooLarge(limit)
    } else {
        PipelineError::InvalidRequest(err.body_text())
    }
}

fn json_error(rejection: JsonRejection) -> PipelineError {
    PipelineError::InvalidRequest(rejection.body_text())
}
