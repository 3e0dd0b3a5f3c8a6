//! Chat message domain object.
//!
//! A `ChatMessage` is shared behind an `Arc` between the dispatcher, tracked
//! entity handlers, and application code. Mutable fields live in a
//! `parking_lot::RwLock`; the disposed flag is an atomic read on every
//! mutation path so a disposed message is never touched again, regardless
//! of which task still holds a handler for it.

use super::{MessageId, RoomId, UserId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// A message in a chat room.
#[derive(Debug)]
pub struct ChatMessage {
    id: MessageId,
    room_id: RoomId,
    author_id: UserId,
    posted_at: DateTime<Utc>,
    state: RwLock<MessageState>,
    disposed: AtomicBool,
}

#[derive(Debug)]
struct MessageState {
    content: String,
    edit_count: u32,
    deleted: bool,
    star_count: u32,
    pin_count: u32,
}

impl ChatMessage {
    /// Create a message from decoded or fetched fields.
    pub fn new(
        id: MessageId,
        room_id: RoomId,
        author_id: UserId,
        content: impl Into<String>,
        posted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            room_id,
            author_id,
            posted_at,
            state: RwLock::new(MessageState {
                content: content.into(),
                edit_count: 0,
                deleted: false,
                star_count: 0,
                pin_count: 0,
            }),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn author_id(&self) -> UserId {
        self.author_id
    }

    pub fn posted_at(&self) -> DateTime<Utc> {
        self.posted_at
    }

    /// Current message body.
    pub fn content(&self) -> String {
        self.state.read().content.clone()
    }

    /// Number of edits applied to this instance since tracking began.
    pub fn edit_count(&self) -> u32 {
        self.state.read().edit_count
    }

    /// Whether the remote service deleted this message. A deleted message
    /// stays live (and tracked); it is only flagged.
    pub fn is_deleted(&self) -> bool {
        self.state.read().deleted
    }

    pub fn star_count(&self) -> u32 {
        self.state.read().star_count
    }

    pub fn pin_count(&self) -> u32 {
        self.state.read().pin_count
    }

    /// Apply an edit: replace the body and bump the edit counter.
    /// No-op once disposed.
    pub fn apply_edit(&self, content: impl Into<String>) {
        if self.is_disposed() {
            return;
        }
        let mut state = self.state.write();
        state.content = content.into();
        state.edit_count += 1;
    }

    /// Flag the message as deleted. No-op once disposed.
    pub fn apply_delete(&self) {
        if self.is_disposed() {
            return;
        }
        self.state.write().deleted = true;
    }

    /// Update star/pin counts from a star-toggle event. No-op once disposed.
    pub fn apply_star(&self, stars: u32, pins: u32) {
        if self.is_disposed() {
            return;
        }
        let mut state = self.state.write();
        state.star_count = stars;
        state.pin_count = pins;
    }

    /// Permanently retire this instance. Terminal: every later `apply_*`
    /// is a no-op. Idempotent.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
