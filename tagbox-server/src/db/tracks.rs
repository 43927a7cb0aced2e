//! Track repository

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tagbox_common::events::TrackInfo;
use tagbox_common::{Error, Result};
use uuid::Uuid;

fn row_to_info(row: (Uuid, Uuid, String, String, Option<i64>, i64)) -> TrackInfo {
    let (track_id, playlist_id, title, file_path, duration_ms, position) = row;
    TrackInfo {
        track_id,
        playlist_id,
        title,
        file_path,
        duration_ms: duration_ms.map(|d| d.max(0) as u64),
        position: position.max(0) as u32,
    }
}

/// Append a track to the end of a playlist
pub async fn create_track(
    db: &Pool<Sqlite>,
    playlist_id: Uuid,
    title: &str,
    file_path: &str,
    duration_ms: Option<u64>,
) -> Result<TrackInfo> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM playlists WHERE playlist_id = ?)")
        .bind(playlist_id)
        .fetch_one(db)
        .await?;
    if !exists {
        return Err(Error::NotFound(format!("playlist not found: {}", playlist_id)));
    }

    let position: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(position) + 1, 0) FROM tracks WHERE playlist_id = ?")
            .bind(playlist_id)
            .fetch_one(db)
            .await?;

    let track_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO tracks (track_id, playlist_id, title, file_path, duration_ms, position, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(track_id)
    .bind(playlist_id)
    .bind(title)
    .bind(file_path)
    .bind(duration_ms.map(|d| d as i64))
    .bind(position)
    .bind(Utc::now())
    .execute(db)
    .await?;

    Ok(TrackInfo {
        track_id,
        playlist_id,
        title: title.to_string(),
        file_path: file_path.to_string(),
        duration_ms,
        position: position.max(0) as u32,
    })
}

/// Get a single track
pub async fn get_track(db: &Pool<Sqlite>, track_id: Uuid) -> Result<Option<TrackInfo>> {
    let row: Option<(Uuid, Uuid, String, String, Option<i64>, i64)> = sqlx::query_as(
        "SELECT track_id, playlist_id, title, file_path, duration_ms, position FROM tracks WHERE track_id = ?",
    )
    .bind(track_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(row_to_info))
}

/// List a playlist's tracks in play order
pub async fn list_tracks(db: &Pool<Sqlite>, playlist_id: Uuid) -> Result<Vec<TrackInfo>> {
    let rows: Vec<(Uuid, Uuid, String, String, Option<i64>, i64)> = sqlx::query_as(
        r#"
        SELECT track_id, playlist_id, title, file_path, duration_ms, position
        FROM tracks WHERE playlist_id = ? ORDER BY position
        "#,
    )
    .bind(playlist_id)
    .fetch_all(db)
    .await?;

    Ok(rows.into_iter().map(row_to_info).collect())
}

/// Remove a track; returns the removed track for cleanup and broadcast
pub async fn delete_track(db: &Pool<Sqlite>, track_id: Uuid) -> Result<TrackInfo> {
    let track = get_track(db, track_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("track not found: {}", track_id)))?;

    sqlx::query("DELETE FROM tracks WHERE track_id = ?")
        .bind(track_id)
        .execute(db)
        .await?;

    Ok(track)
}
