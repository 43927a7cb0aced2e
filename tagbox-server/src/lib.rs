//! # tagbox Server Library
//!
//! NFC-triggered music box with a synchronized browser control surface.
//!
//! **Purpose:** keep many loosely-connected clients in agreement with one
//! authoritative server state: a sequence-numbered event stream with
//! room-based fan-out and reconnection catch-up, idempotent operation
//! acknowledgment, chunked resumable uploads, and time-boxed NFC tag
//! association, all over HTTP/SSE.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod nfc;
pub mod playback;
pub mod state;
pub mod sync;
pub mod tasks;
pub mod upload;

pub use error::{ApiError, ApiResult};
pub use state::AppContext;
