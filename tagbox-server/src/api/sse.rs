//! SSE event stream
//!
//! Each connection becomes one registered session. The first envelope carries
//! the session id the client needs for subscribe/unsubscribe/catch-up calls;
//! everything after is whatever the fan-out delivers for the session's rooms.
//! Dropping the stream unregisters the session.

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use chrono::Utc;
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tagbox_common::events::{EventEnvelope, TagboxEvent};
use tagbox_common::time;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::state::AppContext;
use crate::sync::SessionRegistry;

/// Unregisters the session when the client stream is dropped
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    session_id: Uuid,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.session_id);
    }
}

fn envelope_to_event(envelope: &EventEnvelope) -> Event {
    match Event::default()
        .event(&envelope.event_type)
        .json_data(envelope)
    {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, event_type = %envelope.event_type, "failed to serialize envelope");
            Event::default().comment("serialization error")
        }
    }
}

/// GET /api/v1/events - connect a session to the event stream
pub async fn events(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, mut rx) = mpsc::channel::<EventEnvelope>(ctx.config.session_channel_capacity);
    let session_id = ctx.registry.register(tx);
    info!(
        session_id = %session_id,
        total = ctx.registry.session_count(),
        "SSE client connected"
    );

    let server_seq = ctx.broadcaster.allocator().current_global();
    let hello = TagboxEvent::ConnectionEstablished {
        session_id,
        server_seq,
        timestamp: Utc::now(),
    };
    let initial = EventEnvelope {
        event_type: hello.event_type().to_string(),
        server_seq,
        playlist_seq: None,
        room: String::new(),
        data: hello,
        timestamp: time::epoch_ms(),
        event_id: Uuid::new_v4(),
    };

    let registry = Arc::clone(&ctx.registry);
    let stream = async_stream::stream! {
        let _guard = SessionGuard { registry, session_id };

        yield Ok(envelope_to_event(&initial));
        while let Some(envelope) = rx.recv().await {
            yield Ok(envelope_to_event(&envelope));
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
