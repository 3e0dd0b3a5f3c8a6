//! Chat user domain object.

use super::UserId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A user's access level in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessLevel {
    /// Explicitly barred from the room.
    Denied,
    /// May read but not post.
    Read,
    /// Normal participant.
    #[default]
    ReadWrite,
    /// Room owner / moderator.
    Owner,
}

impl AccessLevel {
    /// Parse the event-feed spelling of an access level.
    pub fn parse(text: &str) -> Option<Self> {
        Some(match text {
            "denied" => Self::Denied,
            "read" => Self::Read,
            "read_write" | "read-write" => Self::ReadWrite,
            "owner" => Self::Owner,
            _ => return None,
        })
    }
}

/// A user visible to the session.
#[derive(Debug)]
pub struct ChatUser {
    id: UserId,
    state: RwLock<UserState>,
    disposed: AtomicBool,
}

#[derive(Debug)]
struct UserState {
    name: String,
    access: AccessLevel,
}

impl ChatUser {
    pub fn new(id: UserId, name: impl Into<String>, access: AccessLevel) -> Self {
        Self {
            id,
            state: RwLock::new(UserState {
                name: name.into(),
                access,
            }),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub fn access(&self) -> AccessLevel {
        self.state.read().access
    }

    /// Apply an access-level change. No-op once disposed.
    pub fn apply_access(&self, access: AccessLevel) {
        if self.is_disposed() {
            return;
        }
        self.state.write().access = access;
    }

    /// Permanently retire this instance. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
