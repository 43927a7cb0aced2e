//! NFC tag association
//!
//! Pairs a physical tag with a playlist through a time-boxed session: the
//! single active session claims the next raw tag-detected event. A tag that
//! already maps elsewhere parks the session in `Duplicate` until the client
//! either overrides (rewriting the mapping) or stops. Every state change is
//! broadcast to the `"nfc"` room; terminal changes destroy the session.

pub mod reader;
pub mod session;

pub use session::AssociationSession;

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tagbox_common::events::{AssociationState, TagboxEvent, ROOM_NFC};
use tagbox_common::{Error, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::sync::EventBroadcaster;

/// Owns the single active association session
pub struct AssociationManager {
    db: Pool<Sqlite>,
    broadcaster: Arc<EventBroadcaster>,
    active: Mutex<Option<AssociationSession>>,
}

impl AssociationManager {
    pub fn new(db: Pool<Sqlite>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            db,
            broadcaster,
            active: Mutex::new(None),
        }
    }

    fn publish_status(&self, session: &AssociationSession) {
        self.broadcaster.publish(
            TagboxEvent::AssociationStatus {
                assoc_id: session.assoc_id,
                playlist_id: session.playlist_id,
                state: session.state,
                tag_id: session.detected_tag_id.clone(),
                conflict_playlist_id: session.conflict_playlist_id,
                timestamp: Utc::now(),
            },
            ROOM_NFC,
        );
    }

    /// Start listening for the next tag on behalf of a playlist
    ///
    /// A non-terminal session for the same playlist is superseded; one for a
    /// different playlist blocks the start.
    pub async fn start(&self, playlist_id: Uuid, timeout_ms: u64) -> Result<AssociationSession> {
        db::playlists::get_playlist(&self.db, playlist_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("playlist not found: {}", playlist_id)))?;

        let mut active = self.active.lock().await;
        if let Some(existing) = active.as_mut() {
            if !existing.is_terminal() {
                if existing.playlist_id != playlist_id {
                    return Err(Error::Conflict(format!(
                        "association session {} already listening for playlist {}",
                        existing.assoc_id, existing.playlist_id
                    )));
                }
                // Same target: the new session supersedes the old one
                existing.transition_to(AssociationState::Stopped);
                self.publish_status(existing);
                info!(assoc_id = %existing.assoc_id, "association session superseded");
            }
        }

        let session = AssociationSession::new(playlist_id, timeout_ms);
        info!(
            assoc_id = %session.assoc_id,
            playlist_id = %playlist_id,
            timeout_ms,
            "association session listening"
        );
        self.publish_status(&session);
        *active = Some(session.clone());
        Ok(session)
    }

    /// Hardware callback: a raw tag was scanned while a session may be active
    ///
    /// Returns the resulting state, or None when no session was listening
    /// (the caller then treats the scan as a playback trigger).
    pub async fn on_tag_detected(&self, tag_id: &str) -> Result<Option<AssociationState>> {
        let mut active = self.active.lock().await;
        let session = match active.as_mut() {
            Some(s) if s.state == AssociationState::Listening => s,
            _ => return Ok(None),
        };

        session.detected_tag_id = Some(tag_id.to_string());

        let existing = match db::tags::find_mapping(&self.db, tag_id).await {
            Ok(mapping) => mapping,
            Err(e) => {
                session.transition_to(AssociationState::Error);
                self.publish_status(session);
                *active = None;
                return Err(e);
            }
        };

        match existing {
            Some(mapped) if mapped != session.playlist_id => {
                // Conflicting mapping: park in Duplicate, write nothing yet
                session.conflict_playlist_id = Some(mapped);
                session.transition_to(AssociationState::Duplicate);
                info!(
                    assoc_id = %session.assoc_id,
                    tag_id = %tag_id,
                    conflict_playlist_id = %mapped,
                    "tag already mapped elsewhere, awaiting override"
                );
                self.publish_status(session);
                Ok(Some(AssociationState::Duplicate))
            }
            _ => {
                let playlist_id = session.playlist_id;
                let previous = match db::tags::upsert_mapping(&self.db, tag_id, playlist_id).await
                {
                    Ok(previous) => previous,
                    Err(e) => {
                        session.transition_to(AssociationState::Error);
                        self.publish_status(session);
                        *active = None;
                        return Err(e);
                    }
                };

                session.transition_to(AssociationState::Success);
                info!(
                    assoc_id = %session.assoc_id,
                    tag_id = %tag_id,
                    playlist_id = %playlist_id,
                    "tag associated"
                );
                self.broadcaster.publish(
                    TagboxEvent::TagMappingChanged {
                        tag_id: tag_id.to_string(),
                        playlist_id,
                        previous_playlist_id: previous,
                        timestamp: Utc::now(),
                    },
                    ROOM_NFC,
                );
                self.publish_status(session);
                *active = None;
                Ok(Some(AssociationState::Success))
            }
        }
    }

    /// Explicit conflict override: rewrite the mapping to the session target
    ///
    /// Only valid while the session is `Duplicate` for exactly this tag and
    /// playlist. Publishes the mapping rewrite (with the previous playlist so
    /// clients holding the old association refresh) and then the Success
    /// status.
    pub async fn override_mapping(&self, tag_id: &str, playlist_id: Uuid) -> Result<AssociationSession> {
        let mut active = self.active.lock().await;
        let session = active
            .as_mut()
            .ok_or_else(|| Error::NotFound("no active association session".to_string()))?;

        if session.state != AssociationState::Duplicate {
            return Err(Error::InvalidState(format!(
                "override requires a Duplicate session, current state {:?}",
                session.state
            )));
        }
        if session.detected_tag_id.as_deref() != Some(tag_id) {
            return Err(Error::Validation(format!(
                "override tag {} does not match detected tag {:?}",
                tag_id, session.detected_tag_id
            )));
        }
        if session.playlist_id != playlist_id {
            return Err(Error::Validation(format!(
                "override playlist {} does not match session target {}",
                playlist_id, session.playlist_id
            )));
        }

        let previous = match db::tags::upsert_mapping(&self.db, tag_id, playlist_id).await {
            Ok(previous) => previous,
            Err(e) => {
                session.transition_to(AssociationState::Error);
                self.publish_status(session);
                *active = None;
                return Err(e);
            }
        };

        session.transition_to(AssociationState::Success);
        info!(
            assoc_id = %session.assoc_id,
            tag_id = %tag_id,
            playlist_id = %playlist_id,
            previous_playlist_id = ?previous,
            "mapping overridden"
        );
        self.broadcaster.publish(
            TagboxEvent::TagMappingChanged {
                tag_id: tag_id.to_string(),
                playlist_id,
                previous_playlist_id: previous,
                timestamp: Utc::now(),
            },
            ROOM_NFC,
        );
        self.publish_status(session);

        let finished = session.clone();
        *active = None;
        Ok(finished)
    }

    /// Client cancellation, valid from Listening or Duplicate
    pub async fn stop(&self, assoc_id: Uuid) -> Result<()> {
        let mut active = self.active.lock().await;
        let session = match active.as_mut() {
            Some(s) if s.assoc_id == assoc_id => s,
            _ => {
                return Err(Error::NotFound(format!(
                    "association session not found: {}",
                    assoc_id
                )))
            }
        };

        match session.state {
            AssociationState::Listening | AssociationState::Duplicate => {
                session.transition_to(AssociationState::Stopped);
                info!(assoc_id = %assoc_id, "association session stopped");
                self.publish_status(session);
                *active = None;
                Ok(())
            }
            state => Err(Error::InvalidState(format!(
                "cannot stop association session in state {:?}",
                state
            ))),
        }
    }

    /// Timeout sweep; moves an overdue Listening session to Timeout
    pub async fn sweep_timeouts(&self) -> bool {
        let mut active = self.active.lock().await;
        if let Some(session) = active.as_mut() {
            if session.timed_out(Utc::now()) {
                session.transition_to(AssociationState::Timeout);
                warn!(
                    assoc_id = %session.assoc_id,
                    playlist_id = %session.playlist_id,
                    "association session timed out"
                );
                self.publish_status(session);
                *active = None;
                return true;
            }
        }
        false
    }

    /// Snapshot of the active session, if any
    pub async fn active_session(&self) -> Option<AssociationSession> {
        self.active.lock().await.clone()
    }

    /// Whether a session is currently claiming tag events
    pub async fn is_listening(&self) -> bool {
        matches!(
            self.active.lock().await.as_ref(),
            Some(s) if !s.is_terminal()
        )
    }
}
