//! Library types carried in broadcast events

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playlist summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistInfo {
    /// Playlist UUID
    pub playlist_id: Uuid,
    /// Display name
    pub name: String,
    /// Number of tracks currently in the playlist
    pub track_count: u32,
}

/// Track details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Track UUID
    pub track_id: Uuid,
    /// Owning playlist
    pub playlist_id: Uuid,
    /// Display title (derived from the uploaded filename)
    pub title: String,
    /// Path relative to the music root
    pub file_path: String,
    /// Duration in milliseconds, when known
    pub duration_ms: Option<u64>,
    /// Position within the playlist (0-based)
    pub position: u32,
}
