//! Session registry
//!
//! Tracks each live connection, its subscribed rooms, and the last sequence
//! number delivered per room. Sessions are exclusively owned by the registry;
//! the broadcaster only calls in to decide fan-out targets.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tagbox_common::events::EventEnvelope;
use tagbox_common::{Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Event type delivered last-value-wins: dropping a sample under backpressure
/// is fine because a fresher one follows within the throttle window.
const DROPPABLE_EVENT: &str = "PlayerPosition";

/// One live client connection
struct ClientSession {
    subscribed_rooms: HashSet<String>,
    /// Highest sequence delivered per room; duplicate redelivery check
    last_sent_seq: HashMap<String, u64>,
    tx: mpsc::Sender<EventEnvelope>,
}

/// Registry of live sessions
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, ClientSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new connection; the returned id keys all later calls
    pub fn register(&self, tx: mpsc::Sender<EventEnvelope>) -> Uuid {
        let session_id = Uuid::new_v4();
        let session = ClientSession {
            subscribed_rooms: HashSet::new(),
            last_sent_seq: HashMap::new(),
            tx,
        };
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(session_id, session);
        debug!(session_id = %session_id, "session registered");
        session_id
    }

    /// Remove a session on disconnect
    pub fn unregister(&self, session_id: Uuid) {
        if self
            .sessions
            .lock()
            .expect("session lock poisoned")
            .remove(&session_id)
            .is_some()
        {
            debug!(session_id = %session_id, "session unregistered");
        }
    }

    /// Add a room subscription; idempotent, subscribing twice is a no-op
    pub fn subscribe(&self, session_id: Uuid, room: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("session not found: {}", session_id)))?;
        session.subscribed_rooms.insert(room.to_string());
        Ok(())
    }

    /// Remove a room subscription
    pub fn unsubscribe(&self, session_id: Uuid, room: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("session not found: {}", session_id)))?;
        session.subscribed_rooms.remove(room);
        session.last_sent_seq.remove(room);
        Ok(())
    }

    /// Whether the session currently subscribes to the room
    pub fn is_subscribed(&self, session_id: Uuid, room: &str) -> bool {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .get(&session_id)
            .map(|s| s.subscribed_rooms.contains(room))
            .unwrap_or(false)
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }

    /// Number of sessions subscribed to a room
    pub fn subscriber_count(&self, room: &str) -> usize {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .values()
            .filter(|s| s.subscribed_rooms.contains(room))
            .count()
    }

    /// Deliver an envelope to every session subscribed to its room
    ///
    /// Fire-and-forget per session: a full outbound queue drops the envelope
    /// for that session (position samples silently, anything else with a
    /// warning; the client recovers through catch-up or a full resync).
    /// Returns the number of sessions the envelope was queued for.
    pub fn fan_out(&self, envelope: &EventEnvelope) -> usize {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let mut delivered = 0;

        for (session_id, session) in sessions.iter_mut() {
            if !session.subscribed_rooms.contains(&envelope.room) {
                continue;
            }
            // Already delivered at or past this point (redelivery guard)
            if let Some(&last) = session.last_sent_seq.get(&envelope.room) {
                if last >= envelope.server_seq {
                    continue;
                }
            }
            match session.tx.try_send(envelope.clone()) {
                Ok(()) => {
                    session
                        .last_sent_seq
                        .insert(envelope.room.clone(), envelope.server_seq);
                    delivered += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if envelope.event_type != DROPPABLE_EVENT {
                        warn!(
                            session_id = %session_id,
                            room = %envelope.room,
                            server_seq = envelope.server_seq,
                            "outbound queue full, dropping envelope"
                        );
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // Disconnect cleanup races the publish; the stream's
                    // guard will unregister shortly.
                }
            }
        }

        delivered
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
