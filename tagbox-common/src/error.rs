//! Common error types for tagbox
//!
//! Every failure surfaced to a client carries a stable `error_type` tag and a
//! human-readable message. Infrastructure failures (database, filesystem) are
//! flagged retryable so clients can safely retry with the same operation token.

use thiserror::Error;

/// Common result type for tagbox operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared across the server components
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input, rejected before any state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target playlist/track/session/tag absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate NFC mapping, double-finalize, concurrent session conflicts
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Operation attempted against a session in the wrong lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Association session or pending operation expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable tag for client error handling
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Conflict(_) => "conflict",
            Error::InvalidState(_) => "invalid_state",
            Error::Timeout(_) => "timeout",
            #[cfg(feature = "sqlx")]
            Error::Database(_) => "transient_infra",
            Error::Io(_) => "transient_infra",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether a client retry (with the same operation token) is safe and useful
    pub fn retryable(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(_) => true,
            Error::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_tags() {
        assert_eq!(Error::Validation("x".into()).error_type(), "validation");
        assert_eq!(Error::NotFound("x".into()).error_type(), "not_found");
        assert_eq!(Error::Conflict("x".into()).error_type(), "conflict");
        assert_eq!(Error::InvalidState("x".into()).error_type(), "invalid_state");
        assert_eq!(Error::Timeout("x".into()).error_type(), "timeout");
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(io.error_type(), "transient_infra");
    }

    #[test]
    fn test_retryable_flags() {
        assert!(!Error::Validation("x".into()).retryable());
        assert!(!Error::Conflict("x".into()).retryable());
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.retryable());
    }
}
