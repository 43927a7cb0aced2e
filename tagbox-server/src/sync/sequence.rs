//! Sequence number allocation
//!
//! One strictly increasing global counter plus one counter per playlist.
//! Values are never reused; the global counter is seeded at startup from the
//! persisted reservation so restarts cannot regress below emitted values.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

/// How far ahead of the current value the persisted reservation runs.
///
/// The maintenance sweep re-persists the reservation before the allocator can
/// catch up to it, so a crash between sweeps still restarts above every
/// emitted sequence number.
pub const SEQUENCE_HEADROOM: u64 = 10_000;

/// Issues global and per-playlist sequence numbers
pub struct SequenceAllocator {
    global: AtomicU64,
    playlist: Mutex<HashMap<Uuid, u64>>,
}

impl SequenceAllocator {
    /// Allocator starting above `start`: the first `next_global` returns
    /// `start + 1`
    pub fn with_start(start: u64) -> Self {
        Self {
            global: AtomicU64::new(start),
            playlist: Mutex::new(HashMap::new()),
        }
    }

    /// Allocator starting from zero
    pub fn new() -> Self {
        Self::with_start(0)
    }

    /// Next global sequence number (strictly increasing)
    pub fn next_global(&self) -> u64 {
        self.global.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Most recently issued global sequence number
    pub fn current_global(&self) -> u64 {
        self.global.load(Ordering::SeqCst)
    }

    /// Next sequence number for a playlist scope
    pub fn next_for_playlist(&self, playlist_id: Uuid) -> u64 {
        let mut counters = self.playlist.lock().expect("sequence lock poisoned");
        let counter = counters.entry(playlist_id).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Most recently issued sequence number for a playlist scope
    pub fn current_for_playlist(&self, playlist_id: Uuid) -> u64 {
        let counters = self.playlist.lock().expect("sequence lock poisoned");
        counters.get(&playlist_id).copied().unwrap_or(0)
    }
}

impl Default for SequenceAllocator {
    fn default() -> Self {
        Self::new()
    }
}
