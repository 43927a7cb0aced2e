//! Tag detection capability
//!
//! Hardware drivers (or the dev injection endpoint) push raw tag reads into a
//! channel; the listener task routes each read. While an association session
//! is listening the read belongs to it; otherwise a mapped tag triggers
//! playback of its playlist (the jukebox behavior).

use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::AssociationManager;
use crate::db;
use crate::playback::PlayerHandle;

/// One raw tag read from the reader hardware
#[derive(Debug, Clone)]
pub struct TagEvent {
    pub tag_id: String,
}

/// Channel the hardware driver (and the dev endpoint) feed tag reads into
pub fn tag_channel(capacity: usize) -> (mpsc::Sender<TagEvent>, mpsc::Receiver<TagEvent>) {
    mpsc::channel(capacity)
}

/// Consume tag reads until the channel closes
pub async fn run_tag_listener(
    mut rx: mpsc::Receiver<TagEvent>,
    associations: Arc<AssociationManager>,
    player: PlayerHandle,
    db: Pool<Sqlite>,
) {
    info!("tag listener started");
    while let Some(event) = rx.recv().await {
        handle_tag(&event.tag_id, &associations, &player, &db).await;
    }
    info!("tag listener stopped");
}

async fn handle_tag(
    tag_id: &str,
    associations: &AssociationManager,
    player: &PlayerHandle,
    db: &Pool<Sqlite>,
) {
    // An active association session claims the read
    match associations.on_tag_detected(tag_id).await {
        Ok(Some(state)) => {
            info!(tag_id = %tag_id, state = ?state, "tag consumed by association session");
            return;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(tag_id = %tag_id, error = %e, "association handling failed");
            return;
        }
    }

    // No session listening: a mapped tag starts its playlist
    match db::tags::find_mapping(db, tag_id).await {
        Ok(Some(playlist_id)) => {
            info!(tag_id = %tag_id, playlist_id = %playlist_id, "tag mapped, starting playback");
            if let Err(e) = player.load_playlist(playlist_id, 0, true).await {
                warn!(playlist_id = %playlist_id, error = %e, "failed to start playback from tag");
            }
        }
        Ok(None) => {
            info!(tag_id = %tag_id, "unmapped tag ignored");
        }
        Err(e) => {
            warn!(tag_id = %tag_id, error = %e, "tag lookup failed");
        }
    }
}
