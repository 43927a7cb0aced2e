//! Chunked upload endpoints
//!
//! Init and finalize run under idempotency tokens; chunk receipt is
//! idempotent by construction (same index overwrites) so retried PUTs need no
//! token.

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tagbox_common::Error;
use uuid::Uuid;

use super::run_tracked;
use crate::error::ApiResult;
use crate::state::AppContext;
use crate::upload::UploadSession;

#[derive(Debug, Deserialize)]
pub struct InitUploadRequest {
    pub client_op_id: String,
    pub playlist_id: Uuid,
    pub filename: String,
    pub total_size: u64,
    pub chunk_size: u64,
}

#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub client_op_id: String,
    /// Optional hex-encoded SHA-256 of the complete file
    #[serde(default)]
    pub checksum_sha256: Option<String>,
}

/// POST /api/v1/uploads
pub async fn init(
    State(ctx): State<AppContext>,
    Json(req): Json<InitUploadRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "upload_init", || {
        ctx.uploads
            .init(req.playlist_id, &req.filename, req.total_size, req.chunk_size)
    })
    .await
}

/// PUT /api/v1/uploads/:session_id/chunks/:index
pub async fn receive_chunk(
    State(ctx): State<AppContext>,
    Path((session_id, index)): Path<(Uuid, usize)>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let progress = ctx.uploads.receive_chunk(session_id, index, &body).await?;
    Ok(Json(json!({
        "session_id": session_id,
        "chunk_index": index,
        "progress_percent": progress,
    })))
}

/// POST /api/v1/uploads/:session_id/finalize
pub async fn finalize(
    State(ctx): State<AppContext>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<FinalizeRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "upload_finalize", || {
        ctx.uploads
            .finalize(session_id, req.checksum_sha256.as_deref())
    })
    .await
}

/// GET /api/v1/uploads/:session_id
pub async fn status(
    State(ctx): State<AppContext>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<UploadSession>> {
    let session = ctx
        .uploads
        .get(session_id)
        .ok_or_else(|| Error::NotFound(format!("upload session not found: {}", session_id)))?;
    Ok(Json(session))
}

/// DELETE /api/v1/uploads/:session_id
pub async fn cancel(
    State(ctx): State<AppContext>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    ctx.uploads.cancel(session_id).await?;
    Ok(Json(json!({ "session_id": session_id, "status": "cancelled" })))
}
