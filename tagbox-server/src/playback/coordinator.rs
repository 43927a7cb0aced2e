//! Playback coordinator
//!
//! Single owner of the authoritative player state. Commands arrive over an
//! mpsc channel and execute one at a time, so a seek can never race a track
//! advance. Every successful command mutates the state and publishes a player
//! mutation; position callbacks from the audio pipeline are throttled into
//! lightweight position-only events that bypass the operation tracker.

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tagbox_common::events::{PlayerStateInfo, TagboxEvent, TrackInfo, ROOM_PLAYLISTS};
use tagbox_common::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::sink::{AudioSink, SinkEvent};
use crate::db;
use crate::sync::EventBroadcaster;

type Reply = oneshot::Sender<Result<PlayerStateInfo>>;

/// Commands accepted by the coordinator
enum PlayerCommand {
    Play { reply: Reply },
    Pause { reply: Reply },
    Toggle { reply: Reply },
    Stop { reply: Reply },
    Next { reply: Reply },
    Previous { reply: Reply },
    Seek { position_ms: u64, reply: Reply },
    SetVolume { volume: u8, reply: Reply },
    SetMuted { muted: bool, reply: Reply },
    LoadPlaylist {
        playlist_id: Uuid,
        track_index: usize,
        autoplay: bool,
        reply: Reply,
    },
    Snapshot { reply: Reply },
}

/// Handle for sending commands to the coordinator
#[derive(Clone)]
pub struct PlayerHandle {
    tx: mpsc::Sender<PlayerCommand>,
}

impl PlayerHandle {
    async fn send(
        &self,
        build: impl FnOnce(Reply) -> PlayerCommand,
    ) -> Result<PlayerStateInfo> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| Error::Internal("playback coordinator unavailable".to_string()))?;
        rx.await
            .map_err(|_| Error::Internal("playback coordinator dropped reply".to_string()))?
    }

    pub async fn play(&self) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Play { reply }).await
    }

    pub async fn pause(&self) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Pause { reply }).await
    }

    pub async fn toggle(&self) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Toggle { reply }).await
    }

    pub async fn stop(&self) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Stop { reply }).await
    }

    pub async fn next(&self) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Next { reply }).await
    }

    pub async fn previous(&self) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Previous { reply }).await
    }

    pub async fn seek(&self, position_ms: u64) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Seek { position_ms, reply })
            .await
    }

    pub async fn set_volume(&self, volume: u8) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::SetVolume { volume, reply })
            .await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::SetMuted { muted, reply })
            .await
    }

    pub async fn load_playlist(
        &self,
        playlist_id: Uuid,
        track_index: usize,
        autoplay: bool,
    ) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::LoadPlaylist {
            playlist_id,
            track_index,
            autoplay,
            reply,
        })
        .await
    }

    /// Read-only snapshot of the current state
    pub async fn snapshot(&self) -> Result<PlayerStateInfo> {
        self.send(|reply| PlayerCommand::Snapshot { reply }).await
    }
}

/// Spawn the coordinator task
///
/// Returns the command handle and the sink-event sender the audio capability
/// (or a test) feeds position/track-end callbacks into.
pub fn spawn(
    db: Pool<Sqlite>,
    broadcaster: Arc<EventBroadcaster>,
    sink: Box<dyn AudioSink>,
    music_root: PathBuf,
    initial_volume: u8,
    position_interval: Duration,
) -> (PlayerHandle, mpsc::Sender<SinkEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (sink_tx, sink_rx) = mpsc::channel(64);

    let actor = PlayerActor {
        db,
        broadcaster,
        sink,
        music_root,
        state: PlayerStateInfo::idle(initial_volume),
        tracks: Vec::new(),
        position_interval,
        last_position_publish: None,
        // Keeps the sink-event channel open even with no hardware attached
        _sink_tx: sink_tx.clone(),
    };
    tokio::spawn(actor.run(cmd_rx, sink_rx));

    (PlayerHandle { tx: cmd_tx }, sink_tx)
}

struct PlayerActor {
    db: Pool<Sqlite>,
    broadcaster: Arc<EventBroadcaster>,
    sink: Box<dyn AudioSink>,
    music_root: PathBuf,
    state: PlayerStateInfo,
    tracks: Vec<TrackInfo>,
    position_interval: Duration,
    last_position_publish: Option<Instant>,
    _sink_tx: mpsc::Sender<SinkEvent>,
}

impl PlayerActor {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<PlayerCommand>,
        mut sink_rx: mpsc::Receiver<SinkEvent>,
    ) {
        info!("playback coordinator started");
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(event) = sink_rx.recv() => self.handle_sink_event(event).await,
            }
        }
        info!("playback coordinator stopped");
    }

    /// Publish the full state and record the mutation's sequence number
    fn publish_state(&mut self) {
        let envelope = self.broadcaster.publish(
            TagboxEvent::PlayerStateChanged {
                state: self.state.clone(),
                timestamp: Utc::now(),
            },
            ROOM_PLAYLISTS,
        );
        self.state.server_seq = envelope.server_seq;
    }

    fn publish_volume(&mut self) {
        let envelope = self.broadcaster.publish(
            TagboxEvent::VolumeChanged {
                volume: self.state.volume,
                muted: self.state.muted,
                timestamp: Utc::now(),
            },
            ROOM_PLAYLISTS,
        );
        self.state.server_seq = envelope.server_seq;
    }

    /// Level handed to the sink: user volume with mute folded in
    fn effective_level(&self) -> f32 {
        if self.state.muted {
            0.0
        } else {
            self.state.volume as f32 / 100.0
        }
    }

    async fn handle_command(&mut self, command: PlayerCommand) {
        match command {
            PlayerCommand::Play { reply } => {
                let result = self.cmd_play();
                let _ = reply.send(result);
            }
            PlayerCommand::Pause { reply } => {
                let result = self.cmd_pause();
                let _ = reply.send(result);
            }
            PlayerCommand::Toggle { reply } => {
                let result = if self.state.is_playing {
                    self.cmd_pause()
                } else {
                    self.cmd_play()
                };
                let _ = reply.send(result);
            }
            PlayerCommand::Stop { reply } => {
                let result = self.cmd_stop();
                let _ = reply.send(result);
            }
            PlayerCommand::Next { reply } => {
                let result = self.cmd_step(1);
                let _ = reply.send(result);
            }
            PlayerCommand::Previous { reply } => {
                let result = self.cmd_step(-1);
                let _ = reply.send(result);
            }
            PlayerCommand::Seek { position_ms, reply } => {
                let result = self.cmd_seek(position_ms);
                let _ = reply.send(result);
            }
            PlayerCommand::SetVolume { volume, reply } => {
                let result = self.cmd_set_volume(volume).await;
                let _ = reply.send(result);
            }
            PlayerCommand::SetMuted { muted, reply } => {
                let result = self.cmd_set_muted(muted);
                let _ = reply.send(result);
            }
            PlayerCommand::LoadPlaylist {
                playlist_id,
                track_index,
                autoplay,
                reply,
            } => {
                let result = self.cmd_load_playlist(playlist_id, track_index, autoplay).await;
                let _ = reply.send(result);
            }
            PlayerCommand::Snapshot { reply } => {
                let _ = reply.send(Ok(self.state.clone()));
            }
        }
    }

    fn cmd_play(&mut self) -> Result<PlayerStateInfo> {
        if self.state.track_id.is_none() {
            return Err(Error::InvalidState("no track loaded".to_string()));
        }
        if !self.state.is_playing {
            self.sink.play()?;
            self.state.is_playing = true;
            self.publish_state();
        }
        Ok(self.state.clone())
    }

    fn cmd_pause(&mut self) -> Result<PlayerStateInfo> {
        if self.state.is_playing {
            self.sink.pause()?;
            self.state.is_playing = false;
            self.publish_state();
        }
        Ok(self.state.clone())
    }

    fn cmd_stop(&mut self) -> Result<PlayerStateInfo> {
        if self.state.track_id.is_some() {
            self.sink.stop()?;
            self.state.is_playing = false;
            self.state.position_ms = 0;
            self.publish_state();
        }
        Ok(self.state.clone())
    }

    fn cmd_seek(&mut self, position_ms: u64) -> Result<PlayerStateInfo> {
        if self.state.track_id.is_none() {
            return Err(Error::InvalidState("no track loaded".to_string()));
        }
        if position_ms > self.state.duration_ms {
            return Err(Error::Validation(format!(
                "seek position {} out of range [0, {}]",
                position_ms, self.state.duration_ms
            )));
        }
        self.sink.seek(position_ms)?;
        self.state.position_ms = position_ms;
        self.publish_state();
        Ok(self.state.clone())
    }

    fn cmd_step(&mut self, delta: i64) -> Result<PlayerStateInfo> {
        let index = self
            .state
            .track_index
            .ok_or_else(|| Error::InvalidState("no playlist loaded".to_string()))? as i64;
        let target = index + delta;
        if target < 0 {
            return Err(Error::InvalidState("already at first track".to_string()));
        }
        if target as usize >= self.tracks.len() {
            return Err(Error::InvalidState("already at last track".to_string()));
        }
        let keep_playing = self.state.is_playing;
        self.load_track(target as usize, keep_playing)?;
        Ok(self.state.clone())
    }

    async fn cmd_set_volume(&mut self, volume: u8) -> Result<PlayerStateInfo> {
        if volume > 100 {
            return Err(Error::Validation(format!(
                "volume {} out of range [0, 100]",
                volume
            )));
        }
        self.state.volume = volume;
        let level = self.effective_level();
        self.sink.set_volume(level)?;
        self.publish_volume();

        // Best-effort persistence so restarts come back at the same level
        if let Err(e) = db::settings::set_volume(&self.db, volume).await {
            warn!(error = %e, "failed to persist volume");
        }
        Ok(self.state.clone())
    }

    fn cmd_set_muted(&mut self, muted: bool) -> Result<PlayerStateInfo> {
        if self.state.muted != muted {
            self.state.muted = muted;
            let level = self.effective_level();
            self.sink.set_volume(level)?;
            self.publish_volume();
        }
        Ok(self.state.clone())
    }

    async fn cmd_load_playlist(
        &mut self,
        playlist_id: Uuid,
        track_index: usize,
        autoplay: bool,
    ) -> Result<PlayerStateInfo> {
        db::playlists::get_playlist(&self.db, playlist_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("playlist not found: {}", playlist_id)))?;

        let tracks = db::tracks::list_tracks(&self.db, playlist_id).await?;
        if tracks.is_empty() {
            return Err(Error::InvalidState(format!(
                "playlist {} has no tracks",
                playlist_id
            )));
        }
        if track_index >= tracks.len() {
            return Err(Error::Validation(format!(
                "track index {} out of range [0, {})",
                track_index,
                tracks.len()
            )));
        }

        self.tracks = tracks;
        self.load_track(track_index, autoplay)?;
        info!(
            playlist_id = %playlist_id,
            track_index,
            autoplay,
            "playlist loaded"
        );
        Ok(self.state.clone())
    }

    fn load_track(&mut self, index: usize, playing: bool) -> Result<()> {
        let track = &self.tracks[index];
        let path = self.music_root.join(&track.file_path);
        self.sink.load(&path)?;
        if playing {
            self.sink.play()?;
        }

        self.state.playlist_id = Some(track.playlist_id);
        self.state.track_id = Some(track.track_id);
        self.state.track_index = Some(index);
        self.state.duration_ms = track.duration_ms.unwrap_or(0);
        self.state.position_ms = 0;
        self.state.is_playing = playing;
        self.publish_state();
        Ok(())
    }

    async fn handle_sink_event(&mut self, event: SinkEvent) {
        match event {
            SinkEvent::Position {
                position_ms,
                duration_ms,
            } => {
                self.state.position_ms = position_ms;
                if duration_ms > 0 {
                    self.state.duration_ms = duration_ms;
                }

                // Throttled, last-value-wins: at most one position broadcast
                // per interval; skipped samples are superseded anyway
                let due = self
                    .last_position_publish
                    .map(|at| at.elapsed() >= self.position_interval)
                    .unwrap_or(true);
                if due {
                    self.last_position_publish = Some(Instant::now());
                    self.broadcaster.publish(
                        TagboxEvent::PlayerPosition {
                            playlist_id: self.state.playlist_id,
                            track_id: self.state.track_id,
                            position_ms: self.state.position_ms,
                            duration_ms: self.state.duration_ms,
                            playing: self.state.is_playing,
                            timestamp: Utc::now(),
                        },
                        ROOM_PLAYLISTS,
                    );
                }
            }
            SinkEvent::TrackEnded => {
                debug!("track ended");
                let at_end = self
                    .state
                    .track_index
                    .map(|i| i + 1 >= self.tracks.len())
                    .unwrap_or(true);
                if at_end {
                    self.state.is_playing = false;
                    self.state.position_ms = self.state.duration_ms;
                    self.publish_state();
                } else if let Err(e) = self.cmd_step(1) {
                    error!(error = %e, "failed to advance after track end");
                }
            }
        }
    }
}
