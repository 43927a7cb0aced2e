//! # tagbox Common Library
//!
//! Shared code for the tagbox server and its tests:
//! - Event types (TagboxEvent enum) and the broadcast envelope
//! - Room name helpers for the subscription protocol
//! - Common error taxonomy
//! - Timestamp utilities

pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
