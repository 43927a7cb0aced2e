//! Player state snapshot shared between the coordinator and clients

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Snapshot of the authoritative player state
///
/// Produced by the playback coordinator; every external read is a snapshot,
/// never a live reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateInfo {
    /// Whether playback is running
    pub is_playing: bool,

    /// Playlist currently loaded (None when idle)
    pub playlist_id: Option<Uuid>,

    /// Track currently loaded (None when idle)
    pub track_id: Option<Uuid>,

    /// Index of the current track within the playlist
    pub track_index: Option<usize>,

    /// Current position in milliseconds
    pub position_ms: u64,

    /// Duration of the current track in milliseconds (0 when idle)
    pub duration_ms: u64,

    /// Volume level (0-100)
    pub volume: u8,

    /// Whether output is muted
    pub muted: bool,

    /// Global sequence of the last player mutation
    pub server_seq: u64,
}

impl PlayerStateInfo {
    /// Idle state used before anything has been loaded
    pub fn idle(volume: u8) -> Self {
        Self {
            is_playing: false,
            playlist_id: None,
            track_id: None,
            track_index: None,
            position_ms: 0,
            duration_ms: 0,
            volume,
            muted: false,
            server_seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_state() {
        let state = PlayerStateInfo::idle(60);
        assert!(!state.is_playing);
        assert!(state.playlist_id.is_none());
        assert_eq!(state.volume, 60);
        assert_eq!(state.position_ms, 0);
    }
}
