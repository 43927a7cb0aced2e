//! NFC association session
//!
//! A short-lived, single-writer session pairing the next scanned tag with a
//! target playlist. At most one session is active per server; terminal
//! transitions destroy it.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tagbox_common::events::AssociationState;
use uuid::Uuid;

/// One tag-association attempt
#[derive(Debug, Clone, Serialize)]
pub struct AssociationSession {
    pub assoc_id: Uuid,
    pub playlist_id: Uuid,
    pub state: AssociationState,
    /// Tag seen while this session was listening (set on first detection)
    pub detected_tag_id: Option<String>,
    /// Playlist the detected tag already maps to, when state is Duplicate
    pub conflict_playlist_id: Option<Uuid>,
    pub started_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
}

impl AssociationSession {
    pub fn new(playlist_id: Uuid, timeout_ms: u64) -> Self {
        let now = Utc::now();
        Self {
            assoc_id: Uuid::new_v4(),
            playlist_id,
            state: AssociationState::Listening,
            detected_tag_id: None,
            conflict_playlist_id: None,
            started_at: now,
            timeout_at: now + Duration::milliseconds(timeout_ms as i64),
        }
    }

    pub fn transition_to(&mut self, state: AssociationState) {
        self.state = state;
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether the timeout sweep should end this session
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        self.state == AssociationState::Listening && now > self.timeout_at
    }
}
