//! State synchronization core
//!
//! Every mutation is assigned a sequence number, broadcast exactly once per
//! subscriber, and safely retriable by clients using client-supplied
//! idempotency tokens. The pieces:
//!
//! - `sequence`: strictly increasing global and per-playlist counters
//! - `registry`: live sessions, their room subscriptions, delivery channels
//! - `broadcaster`: envelope stamping, per-room ordered fan-out, catch-up
//! - `operations`: idempotency-token tracking with exactly-once settlement

pub mod broadcaster;
pub mod operations;
pub mod registry;
pub mod sequence;

pub use broadcaster::{CatchUpResult, EventBroadcaster};
pub use operations::{OperationOutcome, OperationTracker, PendingOperation, TrackOutcome};
pub use registry::SessionRegistry;
pub use sequence::SequenceAllocator;
