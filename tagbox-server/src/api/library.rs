//! Playlist and track endpoints
//!
//! Library mutations go through the repositories and broadcast their change
//! to the global `"playlists"` room (and the per-playlist room for track
//! removal) after the write succeeds.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tagbox_common::events::{playlist_room, PlaylistInfo, TagboxEvent, TrackInfo, ROOM_PLAYLISTS};
use tagbox_common::Error;
use tracing::warn;
use uuid::Uuid;

use super::run_tracked;
use crate::db;
use crate::error::ApiResult;
use crate::state::AppContext;

#[derive(Debug, Deserialize)]
pub struct CreatePlaylistRequest {
    pub client_op_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenamePlaylistRequest {
    pub client_op_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MutationParams {
    pub client_op_id: String,
}

/// GET /api/v1/playlists
pub async fn list_playlists(State(ctx): State<AppContext>) -> ApiResult<Json<Vec<PlaylistInfo>>> {
    Ok(Json(db::playlists::list_playlists(&ctx.db).await?))
}

/// GET /api/v1/playlists/:playlist_id
pub async fn get_playlist(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
) -> ApiResult<Json<PlaylistInfo>> {
    let playlist = db::playlists::get_playlist(&ctx.db, playlist_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("playlist not found: {}", playlist_id)))?;
    Ok(Json(playlist))
}

/// POST /api/v1/playlists
pub async fn create_playlist(
    State(ctx): State<AppContext>,
    Json(req): Json<CreatePlaylistRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playlist_create", || async {
        let playlist = db::playlists::create_playlist(&ctx.db, &req.name).await?;
        ctx.broadcaster.publish(
            TagboxEvent::PlaylistCreated {
                playlist: playlist.clone(),
                timestamp: Utc::now(),
            },
            ROOM_PLAYLISTS,
        );
        Ok(playlist)
    })
    .await
}

/// PUT /api/v1/playlists/:playlist_id
pub async fn rename_playlist(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
    Json(req): Json<RenamePlaylistRequest>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &req.client_op_id, "playlist_rename", || async {
        let playlist = db::playlists::rename_playlist(&ctx.db, playlist_id, &req.name).await?;
        ctx.broadcaster.publish(
            TagboxEvent::PlaylistRenamed {
                playlist: playlist.clone(),
                timestamp: Utc::now(),
            },
            ROOM_PLAYLISTS,
        );
        Ok(playlist)
    })
    .await
}

/// DELETE /api/v1/playlists/:playlist_id
pub async fn delete_playlist(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
    Query(params): Query<MutationParams>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &params.client_op_id, "playlist_delete", || async {
        let existed = db::playlists::delete_playlist(&ctx.db, playlist_id).await?;
        if !existed {
            return Err(Error::NotFound(format!("playlist not found: {}", playlist_id)));
        }
        ctx.broadcaster.publish(
            TagboxEvent::PlaylistDeleted {
                playlist_id,
                timestamp: Utc::now(),
            },
            ROOM_PLAYLISTS,
        );
        Ok(serde_json::json!({ "playlist_id": playlist_id }))
    })
    .await
}

/// GET /api/v1/playlists/:playlist_id/tracks
pub async fn list_tracks(
    State(ctx): State<AppContext>,
    Path(playlist_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TrackInfo>>> {
    db::playlists::get_playlist(&ctx.db, playlist_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("playlist not found: {}", playlist_id)))?;
    Ok(Json(db::tracks::list_tracks(&ctx.db, playlist_id).await?))
}

/// DELETE /api/v1/tracks/:track_id
pub async fn delete_track(
    State(ctx): State<AppContext>,
    Path(track_id): Path<Uuid>,
    Query(params): Query<MutationParams>,
) -> ApiResult<Json<Value>> {
    run_tracked(&ctx, &params.client_op_id, "track_delete", || async {
        let track = db::tracks::delete_track(&ctx.db, track_id).await?;

        // Best-effort file removal; the library row is already gone
        let path = ctx.config.music_root.join(&track.file_path);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(track_id = %track_id, error = %e, "failed to remove track file");
            }
        }

        ctx.broadcaster.publish(
            TagboxEvent::TrackRemoved {
                playlist_id: track.playlist_id,
                track_id,
                timestamp: Utc::now(),
            },
            &playlist_room(track.playlist_id),
        );
        Ok(track)
    })
    .await
}
