//! Chat room domain object.

use super::RoomId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A chat room's metadata as currently known to the session.
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    state: RwLock<RoomState>,
    disposed: AtomicBool,
}

#[derive(Debug)]
struct RoomState {
    name: String,
    description: String,
}

impl Room {
    pub fn new(id: RoomId, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id,
            state: RwLock::new(RoomState {
                name: name.into(),
                description: description.into(),
            }),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn description(&self) -> String {
        self.state.read().description.clone()
    }

    /// Apply a room-meta change. No-op once disposed.
    pub fn apply_meta(&self, name: impl Into<String>, description: impl Into<String>) {
        if self.is_disposed() {
            return;
        }
        let mut state = self.state.write();
        state.name = name.into();
        state.description = description.into();
    }

    /// Permanently retire this instance. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
