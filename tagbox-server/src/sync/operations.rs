//! Operation tracker
//!
//! Maps client-supplied idempotency tokens to in-flight or completed mutation
//! outcomes. A retried request with the same token never causes a duplicate
//! side effect: while the original is pending the retry sees the pending
//! entry, and after settlement it reads the stored outcome. Settlement is
//! exactly-once; a second resolve or reject is a silent no-op.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tagbox_common::{Error, Result};
use tracing::{debug, warn};

/// Settled result of a tracked operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum OperationOutcome {
    /// Operation succeeded; payload is the operation's result
    Success { result: serde_json::Value },
    /// Operation failed with a taxonomy-tagged error
    Failure {
        error_type: String,
        message: String,
        retryable: bool,
    },
}

/// One tracked operation
#[derive(Debug, Clone, Serialize)]
pub struct PendingOperation {
    pub client_op_id: String,
    pub operation_name: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OperationOutcome>,
}

/// Result of registering an operation token
#[derive(Debug)]
pub enum TrackOutcome {
    /// New operation, proceed with the mutation
    Registered,
    /// Same token is still in flight (client retry storm); do not re-execute
    AlreadyPending(PendingOperation),
    /// Same token already settled; return the stored outcome
    AlreadyResolved(PendingOperation),
}

/// Tracks idempotency tokens and their outcomes
pub struct OperationTracker {
    ops: Mutex<HashMap<String, PendingOperation>>,
}

/// Token format: `{operation_name}_{timestamp}_{random_suffix}`, at least 3
/// underscore-separated segments with a numeric timestamp second-to-last.
pub fn validate_op_id(client_op_id: &str) -> Result<()> {
    let segments: Vec<&str> = client_op_id.split('_').collect();
    if client_op_id.len() > 200 {
        return Err(Error::Validation("client_op_id too long (max 200)".to_string()));
    }
    if segments.len() < 3 || segments.iter().any(|s| s.is_empty()) {
        return Err(Error::Validation(format!(
            "client_op_id must have at least 3 underscore-separated segments: {}",
            client_op_id
        )));
    }
    let timestamp = segments[segments.len() - 2];
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Validation(format!(
            "client_op_id timestamp segment must be numeric: {}",
            client_op_id
        )));
    }
    Ok(())
}

impl OperationTracker {
    pub fn new() -> Self {
        Self {
            ops: Mutex::new(HashMap::new()),
        }
    }

    /// Register a token before executing its mutation
    pub fn track(&self, client_op_id: &str, operation_name: &str) -> Result<TrackOutcome> {
        validate_op_id(client_op_id)?;

        let mut ops = self.ops.lock().expect("operations lock poisoned");
        if let Some(existing) = ops.get(client_op_id) {
            debug!(
                client_op_id = %client_op_id,
                resolved = existing.resolved,
                "duplicate operation token"
            );
            return Ok(if existing.resolved {
                TrackOutcome::AlreadyResolved(existing.clone())
            } else {
                TrackOutcome::AlreadyPending(existing.clone())
            });
        }

        ops.insert(
            client_op_id.to_string(),
            PendingOperation {
                client_op_id: client_op_id.to_string(),
                operation_name: operation_name.to_string(),
                created_at: Utc::now(),
                resolved: false,
                outcome: None,
            },
        );
        Ok(TrackOutcome::Registered)
    }

    /// Settle an operation with a success result; no-op if already settled
    pub fn resolve(&self, client_op_id: &str, result: serde_json::Value) {
        self.settle(client_op_id, OperationOutcome::Success { result });
    }

    /// Settle an operation with a failure; no-op if already settled
    pub fn reject(&self, client_op_id: &str, error: &Error) {
        self.settle(
            client_op_id,
            OperationOutcome::Failure {
                error_type: error.error_type().to_string(),
                message: error.to_string(),
                retryable: error.retryable(),
            },
        );
    }

    fn settle(&self, client_op_id: &str, outcome: OperationOutcome) {
        let mut ops = self.ops.lock().expect("operations lock poisoned");
        match ops.get_mut(client_op_id) {
            Some(op) if !op.resolved => {
                op.resolved = true;
                op.outcome = Some(outcome);
            }
            Some(_) => {
                // Exactly-once settlement: second completion attempt ignored
                debug!(client_op_id = %client_op_id, "operation already settled");
            }
            None => {
                debug!(client_op_id = %client_op_id, "settling unknown operation");
            }
        }
    }

    /// Snapshot of a tracked operation
    pub fn get(&self, client_op_id: &str) -> Option<PendingOperation> {
        self.ops
            .lock()
            .expect("operations lock poisoned")
            .get(client_op_id)
            .cloned()
    }

    /// Force-reject pending entries older than `max_age` and drop settled
    /// entries past the same age. Returns (forced, removed).
    pub fn sweep(&self, max_age: Duration) -> (usize, usize) {
        let cutoff = Utc::now() - max_age;
        let mut ops = self.ops.lock().expect("operations lock poisoned");

        // Settled entries go first so an entry force-rejected below stays
        // readable until the next sweep.
        let before = ops.len();
        ops.retain(|_, op| !(op.resolved && op.created_at < cutoff));
        let removed = before - ops.len();

        let mut forced = 0;
        for op in ops.values_mut() {
            if !op.resolved && op.created_at < cutoff {
                warn!(
                    client_op_id = %op.client_op_id,
                    operation = %op.operation_name,
                    "operation never completed, force-rejecting"
                );
                op.resolved = true;
                op.outcome = Some(OperationOutcome::Failure {
                    error_type: "timeout".to_string(),
                    message: format!("operation {} timed out", op.operation_name),
                    retryable: true,
                });
                forced += 1;
            }
        }

        (forced, removed)
    }

    /// Number of tracked entries (pending and recently settled)
    pub fn len(&self) -> usize {
        self.ops.lock().expect("operations lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OperationTracker {
    fn default() -> Self {
        Self::new()
    }
}
