//! Shared application state
//!
//! `AppContext` wires every owning component together and is cloned into each
//! handler. `initialize` is the single assembly point used by both `main`
//! and the integration tests.

use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tagbox_common::Result;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::ServerConfig;
use crate::db;
use crate::nfc::reader::{self, TagEvent};
use crate::nfc::AssociationManager;
use crate::playback::{self, NullSink, PlayerHandle, SinkEvent};
use crate::sync::sequence::SEQUENCE_HEADROOM;
use crate::sync::{EventBroadcaster, OperationTracker, SequenceAllocator, SessionRegistry};
use crate::upload::UploadManager;

/// Application state shared across handlers and background tasks
#[derive(Clone)]
pub struct AppContext {
    pub db: Pool<Sqlite>,
    pub config: Arc<ServerConfig>,
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub operations: Arc<OperationTracker>,
    pub uploads: Arc<UploadManager>,
    pub associations: Arc<AssociationManager>,
    pub player: PlayerHandle,
    /// Feed for the audio capability's position/track-end callbacks
    pub sink_events: mpsc::Sender<SinkEvent>,
    /// Feed for raw tag reads (hardware driver or dev endpoint)
    pub tag_events: mpsc::Sender<TagEvent>,
}

impl AppContext {
    /// Build the full component graph: database, sync core, session owners,
    /// the playback coordinator, and the tag listener task
    pub async fn initialize(config: ServerConfig) -> Result<Self> {
        let config = Arc::new(config);

        let db = db::connect(&config.database_url).await?;
        db::init::create_schema(&db).await?;

        // Seed the allocator at the persisted reservation and immediately
        // reserve ahead, so a crash can never reissue an emitted sequence
        let reserved = db::settings::load_sequence_reservation(&db).await?;
        let allocator = Arc::new(SequenceAllocator::with_start(reserved));
        db::settings::save_sequence_reservation(&db, reserved + SEQUENCE_HEADROOM).await?;
        info!(start_seq = reserved, "sequence allocator seeded");

        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(EventBroadcaster::new(
            allocator,
            Arc::clone(&registry),
            config.event_buffer_capacity,
        ));
        let operations = Arc::new(OperationTracker::new());

        tokio::fs::create_dir_all(&config.staging_root).await?;
        tokio::fs::create_dir_all(&config.music_root).await?;

        let uploads = Arc::new(UploadManager::new(
            db.clone(),
            Arc::clone(&broadcaster),
            config.staging_root.clone(),
            config.music_root.clone(),
            config.max_upload_bytes,
        ));
        let associations = Arc::new(AssociationManager::new(db.clone(), Arc::clone(&broadcaster)));

        let volume = db::settings::get_volume(&db).await?;
        let (player, sink_events) = playback::spawn(
            db.clone(),
            Arc::clone(&broadcaster),
            Box::new(NullSink::new()),
            config.music_root.clone(),
            volume,
            Duration::from_millis(config.position_publish_interval_ms),
        );

        let (tag_events, tag_rx) = reader::tag_channel(32);
        tokio::spawn(reader::run_tag_listener(
            tag_rx,
            Arc::clone(&associations),
            player.clone(),
            db.clone(),
        ));

        Ok(Self {
            db,
            config,
            registry,
            broadcaster,
            operations,
            uploads,
            associations,
            player,
            sink_events,
            tag_events,
        })
    }
}
