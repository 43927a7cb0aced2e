//! Playback coordination
//!
//! The coordinator actor owns the authoritative player state and serializes
//! all commands against it; the audio pipeline sits behind the `AudioSink`
//! capability trait.

pub mod coordinator;
pub mod sink;

pub use coordinator::{spawn, PlayerHandle};
pub use sink::{AudioSink, NullSink, SinkEvent};
