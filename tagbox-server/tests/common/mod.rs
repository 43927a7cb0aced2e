//! Shared test helpers
#![allow(dead_code)]

use tagbox_common::events::EventEnvelope;
use tagbox_server::config::ServerConfig;
use tagbox_server::state::AppContext;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Config pointing every path at a per-test temp dir
pub fn test_config(dir: &TempDir) -> ServerConfig {
    ServerConfig {
        database_url: format!("sqlite://{}/tagbox-test.db?mode=rwc", dir.path().display()),
        music_root: dir.path().join("music"),
        staging_root: dir.path().join("staging"),
        ..ServerConfig::default()
    }
}

/// Fully initialized component graph over a temp dir
pub async fn setup_ctx() -> (AppContext, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let ctx = AppContext::initialize(test_config(&dir))
        .await
        .expect("initialize app context");
    (ctx, dir)
}

/// Same, but with a caller-tweaked config
pub async fn setup_ctx_with<F: FnOnce(&mut ServerConfig)>(tweak: F) -> (AppContext, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let mut config = test_config(&dir);
    tweak(&mut config);
    let ctx = AppContext::initialize(config)
        .await
        .expect("initialize app context");
    (ctx, dir)
}

/// Register a session the way the SSE handler does, returning its envelope
/// receiver
pub fn connect_session(
    ctx: &AppContext,
    capacity: usize,
) -> (Uuid, mpsc::Receiver<EventEnvelope>) {
    let (tx, rx) = mpsc::channel(capacity);
    let session_id = ctx.registry.register(tx);
    (session_id, rx)
}

/// Well-formed idempotency token for an operation name
pub fn op_id(operation: &str) -> String {
    format!(
        "{}_{}_{}",
        operation,
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple()
    )
}

/// Receive the next envelope or panic after a second
pub async fn next_envelope(rx: &mut mpsc::Receiver<EventEnvelope>) -> EventEnvelope {
    tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for envelope")
        .expect("event channel closed")
}

/// Receive envelopes until one matches the event type, or panic after a second
pub async fn next_envelope_of(
    rx: &mut mpsc::Receiver<EventEnvelope>,
    event_type: &str,
) -> EventEnvelope {
    loop {
        let envelope = next_envelope(rx).await;
        if envelope.event_type == event_type {
            return envelope;
        }
    }
}
