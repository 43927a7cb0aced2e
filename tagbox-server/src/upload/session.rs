//! Chunked upload session state machine
//!
//! The chunks of one transfer arrive as independent, possibly out-of-order
//! network calls, so the transfer is modeled as stored state rather than a
//! suspended function. Status transitions are monotonic; progress is always
//! recomputed from the received-chunk bitmap, never accumulated, so retried
//! chunks cannot drift the percentage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tagbox_common::events::UploadStatus;
use tagbox_common::{Error, Result};
use uuid::Uuid;

/// Longest accepted filename, in bytes
const MAX_FILENAME_BYTES: usize = 255;

/// One chunked upload in flight
#[derive(Debug, Clone, Serialize)]
pub struct UploadSession {
    pub session_id: Uuid,
    pub playlist_id: Uuid,
    pub filename: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub expected_chunk_count: usize,
    #[serde(skip)]
    received: Vec<bool>,
    pub bytes_received: u64,
    pub status: UploadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Reject empty names, path traversal, and over-long names before any state
/// is created
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.is_empty() {
        return Err(Error::Validation("filename must not be empty".to_string()));
    }
    if filename.len() > MAX_FILENAME_BYTES {
        return Err(Error::Validation(format!(
            "filename too long (max {} bytes)",
            MAX_FILENAME_BYTES
        )));
    }
    if filename.contains('/') || filename.contains('\\') || filename.contains('\0') {
        return Err(Error::Validation(format!(
            "filename contains disallowed path characters: {}",
            filename
        )));
    }
    if filename == "." || filename == ".." {
        return Err(Error::Validation("filename must not be a path component".to_string()));
    }
    Ok(())
}

impl UploadSession {
    pub fn new(
        playlist_id: Uuid,
        filename: &str,
        total_size: u64,
        chunk_size: u64,
    ) -> Result<Self> {
        validate_filename(filename)?;
        if total_size == 0 {
            return Err(Error::Validation("total_size must be greater than zero".to_string()));
        }
        if chunk_size == 0 {
            return Err(Error::Validation("chunk_size must be greater than zero".to_string()));
        }

        let expected_chunk_count = total_size.div_ceil(chunk_size) as usize;
        let now = Utc::now();

        Ok(Self {
            session_id: Uuid::new_v4(),
            playlist_id,
            filename: filename.to_string(),
            total_size,
            chunk_size,
            expected_chunk_count,
            received: vec![false; expected_chunk_count],
            bytes_received: 0,
            status: UploadStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Byte length chunk `index` must have
    pub fn expected_chunk_len(&self, index: usize) -> u64 {
        if index + 1 == self.expected_chunk_count {
            self.total_size - self.chunk_size * index as u64
        } else {
            self.chunk_size
        }
    }

    /// Validate a chunk before its bytes are written to staging
    pub fn check_chunk(&self, index: usize, len: u64) -> Result<()> {
        if !self.status.accepts_chunks() {
            return Err(Error::InvalidState(format!(
                "session {} does not accept chunks in status {:?}",
                self.session_id, self.status
            )));
        }
        if index >= self.expected_chunk_count {
            return Err(Error::Validation(format!(
                "chunk index {} out of range [0, {})",
                index, self.expected_chunk_count
            )));
        }
        let expected = self.expected_chunk_len(index);
        if len != expected {
            return Err(Error::Validation(format!(
                "chunk {} has {} bytes, expected {}",
                index, len, expected
            )));
        }
        Ok(())
    }

    /// Record a staged chunk; re-receipt of the same index is idempotent and
    /// does not double-count `bytes_received`
    pub fn mark_chunk(&mut self, index: usize) -> Result<()> {
        if !self.status.accepts_chunks() {
            return Err(Error::InvalidState(format!(
                "session {} does not accept chunks in status {:?}",
                self.session_id, self.status
            )));
        }
        if index >= self.expected_chunk_count {
            return Err(Error::Validation(format!(
                "chunk index {} out of range [0, {})",
                index, self.expected_chunk_count
            )));
        }

        if !self.received[index] {
            self.received[index] = true;
            self.bytes_received += self.expected_chunk_len(index);
        }
        if self.status == UploadStatus::Pending {
            self.status = UploadStatus::InProgress;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Distinct chunk indices received so far
    pub fn received_count(&self) -> usize {
        self.received.iter().filter(|r| **r).count()
    }

    /// True when every index in `[0, expected_chunk_count)` has arrived
    pub fn is_complete(&self) -> bool {
        self.received.iter().all(|r| *r)
    }

    /// Missing indices, for finalize error messages
    pub fn missing_indices(&self) -> Vec<usize> {
        self.received
            .iter()
            .enumerate()
            .filter(|(_, r)| !**r)
            .map(|(i, _)| i)
            .collect()
    }

    /// Progress recomputed from the bitmap
    pub fn progress_percent(&self) -> f32 {
        if self.expected_chunk_count == 0 {
            return 100.0;
        }
        self.received_count() as f32 / self.expected_chunk_count as f32 * 100.0
    }

    /// Move to a new status and touch `updated_at`
    pub fn transition_to(&mut self, status: UploadStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Whether the idle-expiry sweep should reap this session
    pub fn idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.updated_at < cutoff
    }
}
