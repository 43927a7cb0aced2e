//! Chunked upload manager
//!
//! Owns the lifecycle of every chunked transfer: init, chunk receipt into a
//! staging area partitioned by session id, finalize (ordered concatenation,
//! optional checksum verification, track creation, broadcast), cancellation,
//! and idle expiry. Finalize never leaves partial files behind: any failure
//! removes both the partial output and the staged chunks.

pub mod session;

pub use session::UploadSession;

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tagbox_common::events::{playlist_room, TagboxEvent, TrackInfo, UploadStatus};
use tagbox_common::{Error, Result};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::sync::EventBroadcaster;

/// Manages chunked upload sessions and their staging files
pub struct UploadManager {
    db: Pool<Sqlite>,
    broadcaster: Arc<EventBroadcaster>,
    sessions: Mutex<HashMap<Uuid, UploadSession>>,
    staging_root: PathBuf,
    music_root: PathBuf,
    max_upload_bytes: u64,
}

impl UploadManager {
    pub fn new(
        db: Pool<Sqlite>,
        broadcaster: Arc<EventBroadcaster>,
        staging_root: PathBuf,
        music_root: PathBuf,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            db,
            broadcaster,
            sessions: Mutex::new(HashMap::new()),
            staging_root,
            music_root,
            max_upload_bytes,
        }
    }

    fn staging_dir(&self, session_id: Uuid) -> PathBuf {
        self.staging_root.join(session_id.to_string())
    }

    fn chunk_path(&self, session_id: Uuid, index: usize) -> PathBuf {
        self.staging_dir(session_id).join(format!("chunk_{:06}", index))
    }

    /// Start a new upload session for a playlist
    pub async fn init(
        &self,
        playlist_id: Uuid,
        filename: &str,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<UploadSession> {
        if total_size > self.max_upload_bytes {
            return Err(Error::Validation(format!(
                "total_size {} exceeds limit {}",
                total_size, self.max_upload_bytes
            )));
        }
        db::playlists::get_playlist(&self.db, playlist_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("playlist not found: {}", playlist_id)))?;

        let session = UploadSession::new(playlist_id, filename, total_size, chunk_size)?;
        tokio::fs::create_dir_all(self.staging_dir(session.session_id)).await?;

        info!(
            session_id = %session.session_id,
            playlist_id = %playlist_id,
            filename = %session.filename,
            total_size,
            chunks = session.expected_chunk_count,
            "upload session created"
        );

        self.sessions
            .lock()
            .expect("upload sessions lock poisoned")
            .insert(session.session_id, session.clone());

        Ok(session)
    }

    /// Stage one chunk; idempotent per index. Returns overall progress.
    pub async fn receive_chunk(
        &self,
        session_id: Uuid,
        index: usize,
        bytes: &[u8],
    ) -> Result<f32> {
        // Validate against current session state before touching the disk
        {
            let sessions = self.sessions.lock().expect("upload sessions lock poisoned");
            let session = sessions
                .get(&session_id)
                .ok_or_else(|| Error::NotFound(format!("upload session not found: {}", session_id)))?;
            session.check_chunk(index, bytes.len() as u64)?;
        }

        tokio::fs::write(self.chunk_path(session_id, index), bytes).await?;

        let (playlist_id, progress, received, expected) = {
            let mut sessions = self.sessions.lock().expect("upload sessions lock poisoned");
            let session = sessions
                .get_mut(&session_id)
                .ok_or_else(|| Error::NotFound(format!("upload session not found: {}", session_id)))?;
            session.mark_chunk(index)?;
            (
                session.playlist_id,
                session.progress_percent(),
                session.received_count(),
                session.expected_chunk_count,
            )
        };

        self.broadcaster.publish(
            TagboxEvent::UploadProgress {
                session_id,
                playlist_id,
                percent: progress,
                received_chunks: received,
                expected_chunks: expected,
                timestamp: Utc::now(),
            },
            &playlist_room(playlist_id),
        );

        Ok(progress)
    }

    /// Concatenate staged chunks into the final file, verify the optional
    /// checksum, create the track record, and broadcast the mutation
    pub async fn finalize(
        &self,
        session_id: Uuid,
        checksum_sha256: Option<&str>,
    ) -> Result<TrackInfo> {
        let (playlist_id, filename, expected_chunks) = {
            let mut sessions = self.sessions.lock().expect("upload sessions lock poisoned");
            let session = sessions
                .get_mut(&session_id)
                .ok_or_else(|| Error::NotFound(format!("upload session not found: {}", session_id)))?;

            match session.status {
                UploadStatus::Pending | UploadStatus::InProgress => {}
                UploadStatus::Finalizing | UploadStatus::Complete => {
                    return Err(Error::Conflict(format!(
                        "upload session {} already finalized",
                        session_id
                    )));
                }
                UploadStatus::Failed | UploadStatus::Expired => {
                    return Err(Error::InvalidState(format!(
                        "upload session {} is terminal ({:?})",
                        session_id, session.status
                    )));
                }
            }
            if !session.is_complete() {
                let missing = session.missing_indices();
                return Err(Error::InvalidState(format!(
                    "upload incomplete: {} of {} chunks missing (first missing index {})",
                    missing.len(),
                    session.expected_chunk_count,
                    missing[0]
                )));
            }

            session.transition_to(UploadStatus::Finalizing);
            (
                session.playlist_id,
                session.filename.clone(),
                session.expected_chunk_count,
            )
        };

        match self
            .assemble(session_id, playlist_id, &filename, expected_chunks, checksum_sha256)
            .await
        {
            Ok(track) => {
                {
                    let mut sessions =
                        self.sessions.lock().expect("upload sessions lock poisoned");
                    if let Some(session) = sessions.get_mut(&session_id) {
                        session.transition_to(UploadStatus::Complete);
                    }
                }
                self.remove_staging(session_id).await;

                info!(
                    session_id = %session_id,
                    track_id = %track.track_id,
                    "upload finalized"
                );
                self.broadcaster.publish(
                    TagboxEvent::TrackAdded {
                        playlist_id,
                        track: track.clone(),
                        timestamp: Utc::now(),
                    },
                    &playlist_room(playlist_id),
                );
                Ok(track)
            }
            Err(e) => {
                self.fail_session(session_id, UploadStatus::Failed, &e.to_string())
                    .await;
                Err(e)
            }
        }
    }

    /// Build the final file and track record; on any error the caller cleans
    /// up session state while this function removes its own partial output
    async fn assemble(
        &self,
        session_id: Uuid,
        playlist_id: Uuid,
        filename: &str,
        expected_chunks: usize,
        checksum_sha256: Option<&str>,
    ) -> Result<TrackInfo> {
        let rel_path = format!("{}/{}_{}", playlist_id, session_id, filename);
        let final_path = self.music_root.join(&rel_path);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let result: Result<()> = async {
            use tokio::io::AsyncWriteExt;

            let mut hasher = Sha256::new();
            let mut output = tokio::fs::File::create(&final_path).await?;
            for index in 0..expected_chunks {
                let chunk = tokio::fs::read(self.chunk_path(session_id, index)).await?;
                hasher.update(&chunk);
                output.write_all(&chunk).await?;
            }
            output.flush().await?;

            if let Some(expected) = checksum_sha256 {
                let actual = hex::encode(hasher.finalize());
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(Error::Validation(format!(
                        "checksum mismatch: expected {}, computed {}",
                        expected, actual
                    )));
                }
            }
            Ok(())
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&final_path).await;
            return Err(e);
        }

        let title = filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(filename);
        match db::tracks::create_track(&self.db, playlist_id, title, &rel_path, None).await {
            Ok(track) => Ok(track),
            Err(e) => {
                let _ = tokio::fs::remove_file(&final_path).await;
                Err(e)
            }
        }
    }

    /// Client-initiated cancellation
    pub async fn cancel(&self, session_id: Uuid) -> Result<()> {
        {
            let sessions = self.sessions.lock().expect("upload sessions lock poisoned");
            let session = sessions
                .get(&session_id)
                .ok_or_else(|| Error::NotFound(format!("upload session not found: {}", session_id)))?;
            if session.status.is_terminal() {
                return Err(Error::InvalidState(format!(
                    "upload session {} already terminal ({:?})",
                    session_id, session.status
                )));
            }
        }
        self.fail_session(session_id, UploadStatus::Failed, "cancelled by client")
            .await;
        Ok(())
    }

    /// Snapshot of a session
    pub fn get(&self, session_id: Uuid) -> Option<UploadSession> {
        self.sessions
            .lock()
            .expect("upload sessions lock poisoned")
            .get(&session_id)
            .cloned()
    }

    /// Expire sessions with no activity inside the window and drop terminal
    /// sessions past it. Returns the number of sessions expired.
    pub async fn expire_idle_sessions(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;

        let idle: Vec<Uuid> = {
            let mut sessions = self.sessions.lock().expect("upload sessions lock poisoned");
            sessions.retain(|_, s| !(s.status.is_terminal() && s.updated_at < cutoff));
            sessions
                .values()
                .filter(|s| s.idle_since(cutoff))
                .map(|s| s.session_id)
                .collect()
        };

        for session_id in &idle {
            warn!(session_id = %session_id, "upload session idle, expiring");
            self.fail_session(*session_id, UploadStatus::Expired, "idle timeout")
                .await;
        }

        idle.len()
    }

    /// Move a session to a terminal failure state, remove staging, broadcast
    async fn fail_session(&self, session_id: Uuid, status: UploadStatus, reason: &str) {
        let playlist_id = {
            let mut sessions = self.sessions.lock().expect("upload sessions lock poisoned");
            match sessions.get_mut(&session_id) {
                Some(session) if !session.status.is_terminal() => {
                    session.transition_to(status);
                    Some(session.playlist_id)
                }
                _ => None,
            }
        };

        self.remove_staging(session_id).await;

        if let Some(playlist_id) = playlist_id {
            self.broadcaster.publish(
                TagboxEvent::UploadFailed {
                    session_id,
                    playlist_id,
                    status,
                    reason: reason.to_string(),
                    timestamp: Utc::now(),
                },
                &playlist_room(playlist_id),
            );
        }
    }

    async fn remove_staging(&self, session_id: Uuid) {
        let dir = self.staging_dir(session_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id = %session_id, error = %e, "failed to remove staging dir");
            }
        }
    }
}
