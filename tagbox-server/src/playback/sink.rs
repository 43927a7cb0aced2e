//! Audio output capability
//!
//! The decode/output pipeline is a collaborator behind this trait: the
//! coordinator drives it with load/play/pause/seek/volume calls and consumes
//! its position and track-end callbacks as `SinkEvent`s on a channel.

use std::path::{Path, PathBuf};
use tagbox_common::Result;
use tracing::debug;

/// Asynchronous callbacks from the audio pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Periodic position sample for the loaded track
    Position { position_ms: u64, duration_ms: u64 },
    /// The loaded track played to its end
    TrackEnded,
}

/// Playback capability consumed by the coordinator
pub trait AudioSink: Send {
    fn load(&mut self, path: &Path) -> Result<()>;
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn seek(&mut self, position_ms: u64) -> Result<()>;
    /// Effective output level, 0.0-1.0 (mute folds in here)
    fn set_volume(&mut self, level: f32) -> Result<()>;
}

/// No-hardware sink for headless operation and tests
///
/// Accepts every command and remembers what it was told; position and
/// track-end events come from whoever holds the sink-event sender.
#[derive(Debug, Default)]
pub struct NullSink {
    pub loaded: Option<PathBuf>,
    pub playing: bool,
    pub volume: f32,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for NullSink {
    fn load(&mut self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "null sink: load");
        self.loaded = Some(path.to_path_buf());
        self.playing = false;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        debug!("null sink: play");
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        debug!("null sink: pause");
        self.playing = false;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        debug!("null sink: stop");
        self.playing = false;
        Ok(())
    }

    fn seek(&mut self, position_ms: u64) -> Result<()> {
        debug!(position_ms, "null sink: seek");
        Ok(())
    }

    fn set_volume(&mut self, level: f32) -> Result<()> {
        debug!(level, "null sink: set_volume");
        self.volume = level.clamp(0.0, 1.0);
        Ok(())
    }
}
