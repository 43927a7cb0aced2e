//! NFC association endpoints
//!
//! `tag-reads` injects a raw read into the same channel a hardware reader
//! would use; on hardware-less deployments it is the only way to drive the
//! flow.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tagbox_common::Error;
use uuid::Uuid;

use super::run_tracked;
use crate::db;
use crate::error::ApiResult;
use crate::nfc::reader::TagEvent;
use crate::nfc::AssociationSession;
use crate::state::AppContext;

#[derive(Debug, Deserialize)]
pub struct StartAssociationRequest {
    pub client_op_id: String,
    pub playlist_id: Uuid,
    /// Listening window; server default applies when absent
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    pub client_op_id: String,
    pub tag_id: String,
    pub playlist_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TagReadRequest {
    pub tag_id: String,
}

/// POST /api/v1/nfc/associations
pub async fn start_association(
    State(ctx): State<AppContext>,
    Json(req): Json<StartAssociationRequest>,
) -> ApiResult<Json<Value>> {
    let timeout_ms = req.timeout_ms.unwrap_or(ctx.config.association_timeout_ms);
    run_tracked(&ctx, &req.client_op_id, "nfc_associate", || {
        ctx.associations.start(req.playlist_id, timeout_ms)
    })
    .await
}

/// GET /api/v1/nfc/associations/current
pub async fn current_association(
    State(ctx): State<AppContext>,
) -> ApiResult<Json<Option<AssociationSession>>> {
    Ok(Json(ctx.associations.active_session().await))
}

/// DELETE /api/v1/nfc/associations/:assoc_id
pub async fn stop_association(
    State(ctx): State<AppContext>,
    Path(assoc_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    ctx.associations.stop(assoc_id).await?;
    Ok(Json(json!({ "assoc_id": assoc_id, "status": "stopped" })))
}

/// POST /api/v1/nfc/override
pub async fn override_mapping(
    State(ctx): State<AppContext>,
    Json(req): Json<OverrideRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "nfc_override", || {
        ctx.associations
            .override_mapping(&req.tag_id, req.playlist_id)
    })
    .await
}

/// GET /api/v1/nfc/mappings
pub async fn list_mappings(State(ctx): State<AppContext>) -> ApiResult<Json<Value>> {
    let mappings = db::tags::list_mappings(&ctx.db).await?;
    let mappings: Vec<Value> = mappings
        .into_iter()
        .map(|m| {
            json!({
                "tag_id": m.tag_id,
                "playlist_id": m.playlist_id,
                "updated_at": m.updated_at,
            })
        })
        .collect();
    Ok(Json(json!({ "mappings": mappings })))
}

/// POST /api/v1/nfc/tag-reads - inject a raw tag read
pub async fn inject_tag_read(
    State(ctx): State<AppContext>,
    Json(req): Json<TagReadRequest>,
) -> ApiResult<Json<Value>> {
    if req.tag_id.trim().is_empty() {
        return Err(Error::Validation("tag_id must not be empty".to_string()).into());
    }
    ctx.tag_events
        .send(TagEvent { tag_id: req.tag_id.clone() })
        .await
        .map_err(|_| Error::Internal("tag listener unavailable".to_string()))?;
    Ok(Json(json!({ "tag_id": req.tag_id, "status": "accepted" })))
}
