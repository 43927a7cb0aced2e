//! Session state enums shared on the wire
//!
//! Both session kinds progress through defined states; transitions are
//! monotonic (never backward) and terminal states destroy the session.

use serde::{Deserialize, Serialize};

/// NFC association session state
///
/// `Listening -> {Duplicate | Success | Timeout}`;
/// `Duplicate -> {Success (explicit override) | Stopped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssociationState {
    /// Waiting for the next raw tag-detected event
    Listening,
    /// Detected tag already maps to a different playlist; awaiting override
    Duplicate,
    /// Mapping written
    Success,
    /// Cancelled by the client
    Stopped,
    /// No tag arrived before the deadline
    Timeout,
    /// Infrastructure failure while writing the mapping
    Error,
}

impl AssociationState {
    /// Terminal states destroy the session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssociationState::Success
                | AssociationState::Stopped
                | AssociationState::Timeout
                | AssociationState::Error
        )
    }
}

/// Chunked upload session status
///
/// `Pending -> InProgress -> Finalizing -> Complete`, with `Failed`/`Expired`
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    /// Created, no chunk received yet
    Pending,
    /// At least one chunk received
    InProgress,
    /// Finalize in progress (concatenation and verification)
    Finalizing,
    /// Final file written and track published
    Complete,
    /// Failed or cancelled; staging removed
    Failed,
    /// Idle too long; staging removed by the sweep
    Expired,
}

impl UploadStatus {
    /// Terminal states are garbage-collected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Complete | UploadStatus::Failed | UploadStatus::Expired
        )
    }

    /// Whether chunk receipt is still allowed
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, UploadStatus::Pending | UploadStatus::InProgress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_association_terminal_states() {
        assert!(!AssociationState::Listening.is_terminal());
        assert!(!AssociationState::Duplicate.is_terminal());
        assert!(AssociationState::Success.is_terminal());
        assert!(AssociationState::Stopped.is_terminal());
        assert!(AssociationState::Timeout.is_terminal());
        assert!(AssociationState::Error.is_terminal());
    }

    #[test]
    fn test_upload_status_lifecycle() {
        assert!(UploadStatus::Pending.accepts_chunks());
        assert!(UploadStatus::InProgress.accepts_chunks());
        assert!(!UploadStatus::Finalizing.accepts_chunks());
        assert!(UploadStatus::Complete.is_terminal());
        assert!(UploadStatus::Expired.is_terminal());
        assert!(!UploadStatus::Finalizing.is_terminal());
    }

    #[test]
    fn test_uppercase_wire_format() {
        let json = serde_json::to_string(&AssociationState::Listening).unwrap();
        assert_eq!(json, "\"LISTENING\"");
        let json = serde_json::to_string(&UploadStatus::InProgress).unwrap();
        assert_eq!(json, "\"INPROGRESS\"");
    }
}
