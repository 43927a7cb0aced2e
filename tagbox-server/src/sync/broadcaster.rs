//! Event broadcaster
//!
//! Stamps each mutation with sequence numbers and a timestamp, fans it out to
//! every session subscribed to the target room, and keeps a small per-room
//! ring buffer for short-gap reconnection catch-up. Publishing holds a
//! per-room lock across stamping and fan-out, so within one room delivery
//! order always matches publish call order. Beyond the ring buffer, clients
//! perform a full resync; that is the normal path, not an error.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tagbox_common::events::{
    playlist_id_from_room, EventEnvelope, SubscribeAck, TagboxEvent,
};
use tagbox_common::{time, Result};
use tracing::debug;
use uuid::Uuid;

use super::registry::SessionRegistry;
use super::sequence::SequenceAllocator;

/// Replay buffer for one room
struct RoomLog {
    ring: VecDeque<EventEnvelope>,
    /// server_seq of the most recently evicted envelope (0 = nothing evicted)
    evicted_through: u64,
}

impl RoomLog {
    fn new() -> Self {
        Self {
            ring: VecDeque::new(),
            evicted_through: 0,
        }
    }
}

/// Result of a catch-up request
#[derive(Debug)]
pub struct CatchUpResult {
    /// True when at least one requested room has a gap beyond the buffer;
    /// the client must refetch full state instead of replaying
    pub resync_required: bool,
    /// Buffered envelopes newer than the client's last-known sequence,
    /// per room, in original publish order (empty when resync is required)
    pub rooms: BTreeMap<String, Vec<EventEnvelope>>,
}

/// Stamps mutations and fans them out to subscribed sessions
pub struct EventBroadcaster {
    allocator: Arc<SequenceAllocator>,
    registry: Arc<SessionRegistry>,
    rooms: Mutex<HashMap<String, Arc<Mutex<RoomLog>>>>,
    retention: usize,
}

impl EventBroadcaster {
    pub fn new(
        allocator: Arc<SequenceAllocator>,
        registry: Arc<SessionRegistry>,
        retention: usize,
    ) -> Self {
        Self {
            allocator,
            registry,
            rooms: Mutex::new(HashMap::new()),
            retention: retention.max(1),
        }
    }

    fn room_log(&self, room: &str) -> Arc<Mutex<RoomLog>> {
        let mut rooms = self.rooms.lock().expect("room map lock poisoned");
        Arc::clone(
            rooms
                .entry(room.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(RoomLog::new()))),
        )
    }

    /// Publish a mutation to a room
    ///
    /// Builds the envelope once; redelivery through catch-up reuses the
    /// identical envelope. Returns it so the caller can also answer the
    /// originating request synchronously.
    pub fn publish(&self, event: TagboxEvent, room: &str) -> EventEnvelope {
        let log = self.room_log(room);
        // Held across stamp + buffer + fan-out: per-room publish order is
        // exactly per-room delivery order.
        let mut log = log.lock().expect("room log lock poisoned");

        let server_seq = self.allocator.next_global();
        let playlist_seq =
            playlist_id_from_room(room).map(|id| self.allocator.next_for_playlist(id));

        let envelope = EventEnvelope {
            event_type: event.event_type().to_string(),
            server_seq,
            playlist_seq,
            room: room.to_string(),
            data: event,
            timestamp: time::epoch_ms(),
            event_id: Uuid::new_v4(),
        };

        log.ring.push_back(envelope.clone());
        while log.ring.len() > self.retention {
            if let Some(evicted) = log.ring.pop_front() {
                log.evicted_through = evicted.server_seq;
            }
        }

        let delivered = self.registry.fan_out(&envelope);
        debug!(
            room = %room,
            event_type = %envelope.event_type,
            server_seq,
            delivered,
            "published event"
        );

        envelope
    }

    /// Subscribe a session to a room
    ///
    /// Idempotent; always returns a fresh ack carrying the room's current
    /// sequence numbers so a (re)joining client knows where the room is at.
    pub fn subscribe(&self, session_id: Uuid, room: &str) -> Result<SubscribeAck> {
        self.registry.subscribe(session_id, room)?;
        Ok(SubscribeAck {
            room: room.to_string(),
            success: true,
            server_seq: self.allocator.current_global(),
            playlist_seq: playlist_id_from_room(room)
                .map(|id| self.allocator.current_for_playlist(id)),
        })
    }

    /// Unsubscribe a session from a room
    pub fn unsubscribe(&self, session_id: Uuid, room: &str) -> Result<()> {
        self.registry.unsubscribe(session_id, room)
    }

    /// Catch a reconnecting client up from the ring buffers
    ///
    /// `last_room_seqs` maps room name to the highest `server_seq` the client
    /// saw in that room. If any requested room has lost envelopes beyond the
    /// buffer, the whole reply demands a full resync, since partial replay would
    /// leave the client consistent in some rooms and stale in others.
    pub fn catch_up(&self, last_room_seqs: &HashMap<String, u64>) -> CatchUpResult {
        let mut rooms = BTreeMap::new();

        for (room, &last_seq) in last_room_seqs {
            let log = self.room_log(room);
            let log = log.lock().expect("room log lock poisoned");

            if last_seq < log.evicted_through {
                return CatchUpResult {
                    resync_required: true,
                    rooms: BTreeMap::new(),
                };
            }

            let replay: Vec<EventEnvelope> = log
                .ring
                .iter()
                .filter(|env| env.server_seq > last_seq)
                .cloned()
                .collect();
            rooms.insert(room.clone(), replay);
        }

        CatchUpResult {
            resync_required: false,
            rooms,
        }
    }

    /// Shared allocator handle (for connection acks and snapshots)
    pub fn allocator(&self) -> &SequenceAllocator {
        &self.allocator
    }
}
