//! NFC tag mapping repository
//!
//! One physical tag maps to at most one playlist. Rewrites go through
//! `upsert_mapping`, which reports the previous playlist so callers can
//! broadcast the change.

use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};
use tagbox_common::Result;
use uuid::Uuid;

/// A stored tag-to-playlist mapping
#[derive(Debug, Clone)]
pub struct TagMapping {
    pub tag_id: String,
    pub playlist_id: Uuid,
    pub updated_at: DateTime<Utc>,
}

/// Find the playlist a tag maps to, None when unmapped
pub async fn find_mapping(db: &Pool<Sqlite>, tag_id: &str) -> Result<Option<Uuid>> {
    let playlist_id: Option<Uuid> =
        sqlx::query_scalar("SELECT playlist_id FROM tag_mappings WHERE tag_id = ?")
            .bind(tag_id)
            .fetch_optional(db)
            .await?;
    Ok(playlist_id)
}

/// Write or rewrite a mapping; returns the previously mapped playlist, if any
pub async fn upsert_mapping(
    db: &Pool<Sqlite>,
    tag_id: &str,
    playlist_id: Uuid,
) -> Result<Option<Uuid>> {
    let previous = find_mapping(db, tag_id).await?;
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO tag_mappings (tag_id, playlist_id, created_at, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(tag_id) DO UPDATE SET playlist_id = excluded.playlist_id,
                                          updated_at = excluded.updated_at
        "#,
    )
    .bind(tag_id)
    .bind(playlist_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(previous)
}

/// Remove a mapping; returns false when the tag was unmapped
pub async fn delete_mapping(db: &Pool<Sqlite>, tag_id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tag_mappings WHERE tag_id = ?")
        .bind(tag_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// List all mappings, most recently updated first
pub async fn list_mappings(db: &Pool<Sqlite>) -> Result<Vec<TagMapping>> {
    let rows: Vec<(String, Uuid, DateTime<Utc>)> = sqlx::query_as(
        "SELECT tag_id, playlist_id, updated_at FROM tag_mappings ORDER BY updated_at DESC",
    )
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(tag_id, playlist_id, updated_at)| TagMapping {
            tag_id,
            playlist_id,
            updated_at,
        })
        .collect())
}
