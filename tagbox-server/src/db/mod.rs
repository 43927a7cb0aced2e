//! Database access layer
//!
//! SQLite-backed repositories for playlists, tracks, tag mappings, and the
//! settings key-value store. Schema is created at startup by `init`.

pub mod init;
pub mod playlists;
pub mod settings;
pub mod tags;
pub mod tracks;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use tagbox_common::Result;

/// Open a connection pool for the given SQLite URL
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

// In-memory SQLite is per-connection; a single-connection pool keeps every
// test query on the connection that saw the schema.
#[cfg(test)]
pub(crate) async fn test_pool() -> Pool<Sqlite> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init::create_schema(&pool).await.unwrap();
    pool
}
