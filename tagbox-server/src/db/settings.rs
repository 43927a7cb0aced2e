//! Settings database access
//!
//! Read/write settings from the settings table (key-value store).
//! All settings are global/system-wide.

use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use tagbox_common::Result;

/// Get a typed setting value, None when the key is absent
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    Ok(value.and_then(|v| v.parse::<T>().ok()))
}

/// Set a setting value (insert or replace)
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(value.to_string())
        .execute(db)
        .await?;
    Ok(())
}

/// Get volume setting (0-100)
pub async fn get_volume(db: &Pool<Sqlite>) -> Result<u8> {
    match get_setting::<u8>(db, "volume_level").await? {
        Some(vol) => Ok(vol.min(100)),
        None => {
            set_volume(db, 50).await?;
            Ok(50)
        }
    }
}

/// Set volume setting (0-100)
pub async fn set_volume(db: &Pool<Sqlite>, volume: u8) -> Result<()> {
    set_setting(db, "volume_level", volume.min(100)).await
}

/// Load the persisted sequence reservation
///
/// Sequence numbers at or below this value may already have been handed out
/// before a restart; the allocator must start at or above it.
pub async fn load_sequence_reservation(db: &Pool<Sqlite>) -> Result<u64> {
    Ok(get_setting::<u64>(db, "server_seq_reserved").await?.unwrap_or(0))
}

/// Persist a new sequence reservation high-water mark
pub async fn save_sequence_reservation(db: &Pool<Sqlite>, reserved: u64) -> Result<()> {
    set_setting(db, "server_seq_reserved", reserved).await
}
