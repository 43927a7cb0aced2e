//! Playback control endpoints
//!
//! Every command is forwarded to the coordinator through its handle and runs
//! under the caller's idempotency token.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;
use tagbox_common::events::PlayerStateInfo;
use uuid::Uuid;

use super::run_tracked;
use crate::error::ApiResult;
use crate::state::AppContext;

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    pub client_op_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub client_op_id: String,
    pub position_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub client_op_id: String,
    /// Volume level (0-100)
    pub volume: u8,
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub client_op_id: String,
    pub muted: bool,
}

#[derive(Debug, Deserialize)]
pub struct LoadRequest {
    pub client_op_id: String,
    pub playlist_id: Uuid,
    #[serde(default)]
    pub track_index: usize,
    #[serde(default = "default_autoplay")]
    pub autoplay: bool,
}

fn default_autoplay() -> bool {
    true
}

/// GET /api/v1/playback/state
pub async fn get_state(State(ctx): State<AppContext>) -> ApiResult<Json<PlayerStateInfo>> {
    Ok(Json(ctx.player.snapshot().await?))
}

/// POST /api/v1/playback/play
pub async fn play(
    State(ctx): State<AppContext>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_play", || ctx.player.play()).await
}

/// POST /api/v1/playback/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_pause", || ctx.player.pause()).await
}

/// POST /api/v1/playback/toggle
pub async fn toggle(
    State(ctx): State<AppContext>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_toggle", || ctx.player.toggle()).await
}

/// POST /api/v1/playback/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_stop", || ctx.player.stop()).await
}

/// POST /api/v1/playback/next
pub async fn next(
    State(ctx): State<AppContext>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_next", || ctx.player.next()).await
}

/// POST /api/v1/playback/previous
pub async fn previous(
    State(ctx): State<AppContext>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_previous", || {
        ctx.player.previous()
    })
    .await
}

/// POST /api/v1/playback/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Json(req): Json<SeekRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_seek", || {
        ctx.player.seek(req.position_ms)
    })
    .await
}

/// POST /api/v1/playback/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Json(req): Json<VolumeRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_volume", || {
        ctx.player.set_volume(req.volume)
    })
    .await
}

/// POST /api/v1/playback/mute
pub async fn set_muted(
    State(ctx): State<AppContext>,
    Json(req): Json<MuteRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_mute", || {
        ctx.player.set_muted(req.muted)
    })
    .await
}

/// POST /api/v1/playback/load
pub async fn load_playlist(
    State(ctx): State<AppContext>,
    Json(req): Json<LoadRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playback_load", || {
        ctx.player.load_playlist(req.playlist_id, req.track_index, req.autoplay)
    })
    .await
}
