//! Event types for the tagbox synchronization protocol
//!
//! Every mutation the server performs is expressed as one `TagboxEvent`,
//! wrapped in an `EventEnvelope` stamped with sequence numbers, and fanned out
//! to every session subscribed to the envelope's room. Envelopes are immutable
//! after creation; catch-up redelivery reuses the identical envelope.

mod library_types;
mod playback_types;
mod session_types;

pub use library_types::{PlaylistInfo, TrackInfo};
pub use playback_types::PlayerStateInfo;
pub use session_types::{AssociationState, UploadStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========================================
// Rooms
// ========================================

/// Global room: playlist library changes and player state
pub const ROOM_PLAYLISTS: &str = "playlists";

/// Room for NFC association session status events
pub const ROOM_NFC: &str = "nfc";

/// Per-playlist room name
pub fn playlist_room(playlist_id: Uuid) -> String {
    format!("playlist:{}", playlist_id)
}

/// Extract the playlist id from a `"playlist:{id}"` room name
pub fn playlist_id_from_room(room: &str) -> Option<Uuid> {
    room.strip_prefix("playlist:")
        .and_then(|s| Uuid::parse_str(s).ok())
}

// ========================================
// Events
// ========================================

/// tagbox event types
///
/// Events are broadcast via the room fan-out and serialized for SSE
/// transmission. All events use this central enum for type safety and
/// exhaustive matching; the wire envelope treats the payload as opaque.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TagboxEvent {
    /// First envelope on a new SSE connection; carries the session id the
    /// client uses for subscribe/unsubscribe calls.
    ConnectionEstablished {
        /// Session UUID assigned by the registry
        session_id: Uuid,
        /// Global sequence at connect time
        server_seq: u64,
        /// When the connection was registered
        timestamp: DateTime<Utc>,
    },

    /// Player state changed (play/pause/stop/load/next/previous/seek)
    PlayerStateChanged {
        /// Full snapshot of the authoritative player state
        state: PlayerStateInfo,
        /// When state changed
        timestamp: DateTime<Utc>,
    },

    /// Playback position update (throttled telemetry, not a command response)
    PlayerPosition {
        /// Playlist currently loaded (if any)
        playlist_id: Option<Uuid>,
        /// Track currently loaded (if any)
        track_id: Option<Uuid>,
        /// Current position in milliseconds
        position_ms: u64,
        /// Total duration in milliseconds
        duration_ms: u64,
        /// Whether currently playing
        playing: bool,
        /// When the sample was taken
        timestamp: DateTime<Utc>,
    },

    /// Volume or mute changed
    VolumeChanged {
        /// Volume level (0-100)
        volume: u8,
        /// Whether output is muted
        muted: bool,
        /// When volume changed
        timestamp: DateTime<Utc>,
    },

    /// Playlist created
    PlaylistCreated {
        playlist: PlaylistInfo,
        timestamp: DateTime<Utc>,
    },

    /// Playlist renamed
    PlaylistRenamed {
        playlist: PlaylistInfo,
        timestamp: DateTime<Utc>,
    },

    /// Playlist deleted (tracks and tag mappings removed with it)
    PlaylistDeleted {
        playlist_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Track added to a playlist (upload finalized)
    TrackAdded {
        playlist_id: Uuid,
        track: TrackInfo,
        timestamp: DateTime<Utc>,
    },

    /// Track removed from a playlist
    TrackRemoved {
        playlist_id: Uuid,
        track_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Chunked upload progress (recomputed from the chunk bitmap)
    UploadProgress {
        /// Upload session UUID
        session_id: Uuid,
        /// Target playlist
        playlist_id: Uuid,
        /// Progress percentage (0.0-100.0)
        percent: f32,
        /// Distinct chunk indices received
        received_chunks: usize,
        /// Total chunks expected
        expected_chunks: usize,
        /// When progress was computed
        timestamp: DateTime<Utc>,
    },

    /// Chunked upload failed or expired; staging files were removed
    UploadFailed {
        /// Upload session UUID
        session_id: Uuid,
        /// Target playlist
        playlist_id: Uuid,
        /// Terminal status (Failed or Expired)
        status: UploadStatus,
        /// Failure description
        reason: String,
        /// When the session ended
        timestamp: DateTime<Utc>,
    },

    /// NFC association session status change
    ///
    /// Terminal states (Success/Stopped/Timeout/Error) are the final event for
    /// a session; clients stop showing "waiting for tag" UI on receipt.
    AssociationStatus {
        /// Association session UUID
        assoc_id: Uuid,
        /// Target playlist of the association
        playlist_id: Uuid,
        /// Current session state
        state: AssociationState,
        /// Tag id detected during the session (if any)
        tag_id: Option<String>,
        /// Playlist the tag already maps to, when state is Duplicate
        conflict_playlist_id: Option<Uuid>,
        /// When the state changed
        timestamp: DateTime<Utc>,
    },

    /// A tag-to-playlist mapping was written or rewritten
    ///
    /// Carries the previous playlist so clients that had the old association
    /// loaded can refresh.
    TagMappingChanged {
        /// Physical tag id
        tag_id: String,
        /// Playlist the tag now maps to
        playlist_id: Uuid,
        /// Playlist the tag mapped to before the rewrite (if any)
        previous_playlist_id: Option<Uuid>,
        /// When the mapping changed
        timestamp: DateTime<Utc>,
    },
}

impl TagboxEvent {
    /// Get event type as string for the envelope and SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            TagboxEvent::ConnectionEstablished { .. } => "ConnectionEstablished",
            TagboxEvent::PlayerStateChanged { .. } => "PlayerStateChanged",
            TagboxEvent::PlayerPosition { .. } => "PlayerPosition",
            TagboxEvent::VolumeChanged { .. } => "VolumeChanged",
            TagboxEvent::PlaylistCreated { .. } => "PlaylistCreated",
            TagboxEvent::PlaylistRenamed { .. } => "PlaylistRenamed",
            TagboxEvent::PlaylistDeleted { .. } => "PlaylistDeleted",
            TagboxEvent::TrackAdded { .. } => "TrackAdded",
            TagboxEvent::TrackRemoved { .. } => "TrackRemoved",
            TagboxEvent::UploadProgress { .. } => "UploadProgress",
            TagboxEvent::UploadFailed { .. } => "UploadFailed",
            TagboxEvent::AssociationStatus { .. } => "AssociationStatus",
            TagboxEvent::TagMappingChanged { .. } => "TagMappingChanged",
        }
    }
}

// ========================================
// Envelope
// ========================================

/// The stamped, ordered unit of broadcast data
///
/// Wire shape: `{event_type, server_seq, playlist_seq, data, timestamp,
/// event_id}`. The room is routing metadata and is not serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type tag, duplicated from the payload for cheap client filtering
    pub event_type: String,

    /// Strictly increasing global sequence number
    pub server_seq: u64,

    /// Per-playlist sequence number, when the event is playlist-scoped
    pub playlist_seq: Option<u64>,

    /// Room the envelope was published to (fan-out routing, not serialized)
    #[serde(skip)]
    pub room: String,

    /// Event payload
    pub data: TagboxEvent,

    /// Publish time, epoch milliseconds
    pub timestamp: u64,

    /// Unique envelope id; identical across all receivers and redeliveries
    pub event_id: Uuid,
}

/// Subscription acknowledgment
///
/// Returned from subscribe so a client always learns "what sequence is this
/// room at right now" on (re)join.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeAck {
    /// Room that was subscribed
    pub room: String,
    /// Always true on a returned ack (failures surface as errors)
    pub success: bool,
    /// Current global sequence
    pub server_seq: u64,
    /// Current playlist sequence, for `"playlist:{id}"` rooms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_seq: Option<u64>,
}
