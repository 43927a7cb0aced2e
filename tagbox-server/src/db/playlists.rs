//! Playlist repository

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tagbox_common::events::PlaylistInfo;
use tagbox_common::{Error, Result};
use uuid::Uuid;

/// Create a playlist with a fresh id
pub async fn create_playlist(db: &Pool<Sqlite>, name: &str) -> Result<PlaylistInfo> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("playlist name must not be empty".to_string()));
    }
    if name.len() > 200 {
        return Err(Error::Validation("playlist name too long (max 200)".to_string()));
    }

    let playlist_id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO playlists (playlist_id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(playlist_id)
    .bind(name)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(PlaylistInfo {
        playlist_id,
        name: name.to_string(),
        track_count: 0,
    })
}

/// Get a playlist summary, None when absent
pub async fn get_playlist(db: &Pool<Sqlite>, playlist_id: Uuid) -> Result<Option<PlaylistInfo>> {
    let row: Option<(Uuid, String, i64)> = sqlx::query_as(
        r#"
        SELECT p.playlist_id, p.name, COUNT(t.track_id)
        FROM playlists p
        LEFT JOIN tracks t ON t.playlist_id = p.playlist_id
        WHERE p.playlist_id = ?
        GROUP BY p.playlist_id
        "#,
    )
    .bind(playlist_id)
    .fetch_optional(db)
    .await?;

    Ok(row.map(|(playlist_id, name, count)| PlaylistInfo {
        playlist_id,
        name,
        track_count: count.max(0) as u32,
    }))
}

/// List all playlists ordered by name
pub async fn list_playlists(db: &Pool<Sqlite>) -> Result<Vec<PlaylistInfo>> {
    let rows: Vec<(Uuid, String, i64)> = sqlx::query_as(
        r#"
        SELECT p.playlist_id, p.name, COUNT(t.track_id)
        FROM playlists p
        LEFT JOIN tracks t ON t.playlist_id = p.playlist_id
        GROUP BY p.playlist_id
        ORDER BY p.name
        "#,
    )
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(playlist_id, name, count)| PlaylistInfo {
            playlist_id,
            name,
            track_count: count.max(0) as u32,
        })
        .collect())
}

/// Rename a playlist
pub async fn rename_playlist(db: &Pool<Sqlite>, playlist_id: Uuid, name: &str) -> Result<PlaylistInfo> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::Validation("playlist name must not be empty".to_string()));
    }

    let result = sqlx::query("UPDATE playlists SET name = ?, updated_at = ? WHERE playlist_id = ?")
        .bind(name)
        .bind(Utc::now())
        .bind(playlist_id)
        .execute(db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("playlist not found: {}", playlist_id)));
    }

    get_playlist(db, playlist_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("playlist not found: {}", playlist_id)))
}

/// Delete a playlist with its tracks and tag mappings
///
/// Returns false when the playlist did not exist.
pub async fn delete_playlist(db: &Pool<Sqlite>, playlist_id: Uuid) -> Result<bool> {
    sqlx::query("DELETE FROM tag_mappings WHERE playlist_id = ?")
        .bind(playlist_id)
        .execute(db)
        .await?;
    sqlx::query("DELETE FROM tracks WHERE playlist_id = ?")
        .bind(playlist_id)
        .execute(db)
        .await?;
    let result = sqlx::query("DELETE FROM playlists WHERE playlist_id = ?")
        .bind(playlist_id)
        .execute(db)
        .await?;

    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_create_and_get() {
        let db = test_pool().await;

        let created = create_playlist(&db, "Bedtime Stories").await.unwrap();
        let fetched = get_playlist(&db, created.playlist_id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Bedtime Stories");
        assert_eq!(fetched.track_count, 0);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let db = test_pool().await;
        let err = create_playlist(&db, "   ").await.unwrap_err();
        assert_eq!(err.error_type(), "validation");
    }

    #[tokio::test]
    async fn test_rename_missing_is_not_found() {
        let db = test_pool().await;
        let err = rename_playlist(&db, Uuid::new_v4(), "x").await.unwrap_err();
        assert_eq!(err.error_type(), "not_found");
    }

    #[tokio::test]
    async fn test_delete_removes_tracks_and_mappings() {
        let db = test_pool().await;
        let playlist = create_playlist(&db, "Road Trip").await.unwrap();
        crate::db::tracks::create_track(&db, playlist.playlist_id, "song", "p/song.mp3", None)
            .await
            .unwrap();
        crate::db::tags::upsert_mapping(&db, "tag-1", playlist.playlist_id)
            .await
            .unwrap();

        assert!(delete_playlist(&db, playlist.playlist_id).await.unwrap());
        assert!(get_playlist(&db, playlist.playlist_id).await.unwrap().is_none());
        assert!(crate::db::tags::find_mapping(&db, "tag-1").await.unwrap().is_none());
        assert!(crate::db::tracks::list_tracks(&db, playlist.playlist_id)
            .await
            .unwrap()
            .is_empty());
    }
}
