//! Room subscription and catch-up endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tagbox_common::events::{
    playlist_id_from_room, EventEnvelope, SubscribeAck, ROOM_NFC, ROOM_PLAYLISTS,
};
use tagbox_common::{Error, Result};
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppContext;
use crate::sync::PendingOperation;

#[derive(Debug, Deserialize)]
pub struct RoomRequest {
    pub session_id: Uuid,
    pub room: String,
}

#[derive(Debug, Deserialize)]
pub struct CatchUpRequest {
    /// Highest server_seq the client saw on any room (diagnostic)
    #[serde(default)]
    pub last_global_seq: u64,
    /// Highest server_seq the client saw per room
    #[serde(default)]
    pub last_room_seqs: HashMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct CatchUpResponse {
    pub resync_required: bool,
    pub current_server_seq: u64,
    pub rooms: BTreeMap<String, Vec<EventEnvelope>>,
}

/// Known room shapes: `"playlists"`, `"nfc"`, `"playlist:{uuid}"`
fn validate_room(room: &str) -> Result<()> {
    if room == ROOM_PLAYLISTS || room == ROOM_NFC {
        return Ok(());
    }
    if room.starts_with("playlist:") && playlist_id_from_room(room).is_some() {
        return Ok(());
    }
    Err(Error::Validation(format!("unknown room: {}", room)))
}

/// POST /api/v1/rooms/subscribe
pub async fn subscribe(
    State(ctx): State<AppContext>,
    Json(req): Json<RoomRequest>,
) -> ApiResult<Json<SubscribeAck>> {
    validate_room(&req.room)?;
    let ack = ctx.broadcaster.subscribe(req.session_id, &req.room)?;
    Ok(Json(ack))
}

/// POST /api/v1/rooms/unsubscribe
pub async fn unsubscribe(
    State(ctx): State<AppContext>,
    Json(req): Json<RoomRequest>,
) -> ApiResult<Json<Value>> {
    validate_room(&req.room)?;
    ctx.broadcaster.unsubscribe(req.session_id, &req.room)?;
    Ok(Json(json!({ "room": req.room, "success": true })))
}

/// POST /api/v1/rooms/catch_up
///
/// Replays buffered envelopes newer than the client's last-known sequences,
/// or demands a full resync when the gap exceeds the ring buffer. Clients
/// treat the resync answer as the normal path, not an error.
pub async fn catch_up(
    State(ctx): State<AppContext>,
    Json(req): Json<CatchUpRequest>,
) -> ApiResult<Json<CatchUpResponse>> {
    for room in req.last_room_seqs.keys() {
        validate_room(room)?;
    }
    debug!(
        last_global_seq = req.last_global_seq,
        rooms = req.last_room_seqs.len(),
        "catch-up requested"
    );

    let result = ctx.broadcaster.catch_up(&req.last_room_seqs);
    Ok(Json(CatchUpResponse {
        resync_required: result.resync_required,
        current_server_seq: ctx.broadcaster.allocator().current_global(),
        rooms: result.rooms,
    }))
}

/// GET /api/v1/operations/:client_op_id - poll a tracked operation
pub async fn get_operation(
    State(ctx): State<AppContext>,
    Path(client_op_id): Path<String>,
) -> ApiResult<Json<PendingOperation>> {
    let op = ctx
        .operations
        .get(&client_op_id)
        .ok_or_else(|| Error::NotFound(format!("operation not found: {}", client_op_id)))?;
    Ok(Json(op))
}
