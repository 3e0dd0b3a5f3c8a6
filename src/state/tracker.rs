//! Tracked entity registry.
//!
//! Tracking an entity installs internal sync handlers keyed by event kind.
//! Internal handlers are never externally visible or registerable: each one
//! closes over its own entity, checks the entity's disposed flag, and
//! matches the embedded correlation id before mutating, so unrelated events
//! of the same kind are ignored. Fan-out is one spawned task per entity so
//! a slow handler never delays the others.

use crate::event::{EventArgs, EventKind};
use crate::state::{ChatMessage, ChatUser, Room};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Opaque handle returned by `track_*`, consumed by `untrack`.
pub type TrackingId = u64;

type InternalHandler = Arc<dyn Fn(EventArgs) + Send + Sync>;

struct TrackedEntity {
    handlers: HashMap<EventKind, InternalHandler>,
}

/// Registry of live domain objects kept self-consistent via internal
/// handlers.
#[derive(Default)]
pub struct EntityTracker {
    next_id: AtomicU64,
    entries: DashMap<TrackingId, TrackedEntity>,
}

impl EntityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a message: it self-updates on matching edit, delete, and
    /// star-toggle events.
    pub fn track_message(&self, message: &Arc<ChatMessage>) -> TrackingId {
        let mut handlers: HashMap<EventKind, InternalHandler> = HashMap::new();

        let target = Arc::clone(message);
        handlers.insert(
            EventKind::MessageEdited,
            Arc::new(move |args| {
                if target.is_disposed() {
                    return;
                }
                if let EventArgs::Message(update) = args
                    && update.id() == target.id()
                {
                    target.apply_edit(update.content());
                }
            }),
        );

        let target = Arc::clone(message);
        handlers.insert(
            EventKind::MessageDeleted,
            Arc::new(move |args| {
                if target.is_disposed() {
                    return;
                }
                if let EventArgs::UserMessageId(_, message_id) = args
                    && message_id == target.id()
                {
                    target.apply_delete();
                }
            }),
        );

        let target = Arc::clone(message);
        handlers.insert(
            EventKind::MessageStarToggled,
            Arc::new(move |args| {
                if target.is_disposed() {
                    return;
                }
                if let EventArgs::Star(update, _, stars, pins) = args
                    && update.id() == target.id()
                {
                    target.apply_star(stars, pins);
                }
            }),
        );

        self.insert(handlers)
    }

    /// Track a user: it self-updates on matching access-level changes.
    pub fn track_user(&self, user: &Arc<ChatUser>) -> TrackingId {
        let mut handlers: HashMap<EventKind, InternalHandler> = HashMap::new();

        let target = Arc::clone(user);
        handlers.insert(
            EventKind::AccessLevelChanged,
            Arc::new(move |args| {
                if target.is_disposed() {
                    return;
                }
                if let EventArgs::UserAccess(update, access) = args
                    && update.id() == target.id()
                {
                    target.apply_access(access);
                }
            }),
        );

        self.insert(handlers)
    }

    /// Track a room: it self-updates on matching room-meta changes.
    pub fn track_room(&self, room: &Arc<Room>) -> TrackingId {
        let mut handlers: HashMap<EventKind, InternalHandler> = HashMap::new();

        let target = Arc::clone(room);
        handlers.insert(
            EventKind::RoomMetaChanged,
            Arc::new(move |args| {
                if target.is_disposed() {
                    return;
                }
                if let EventArgs::Room(update) = args
                    && update.id() == target.id()
                {
                    target.apply_meta(update.name(), update.description());
                }
            }),
        );

        self.insert(handlers)
    }

    /// Remove every internal handler for a tracking id. Unknown or
    /// already-untracked ids are a no-op.
    pub fn untrack(&self, id: TrackingId) {
        if self.entries.remove(&id).is_some() {
            trace!(tracking_id = id, "entity untracked");
        }
    }

    /// Number of currently tracked entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Notify every tracked entity holding a handler for `kind`, each on
    /// its own task. Never blocks on handler completion.
    pub(crate) fn notify(&self, kind: EventKind, args: &EventArgs) {
        for entry in self.entries.iter() {
            if let Some(handler) = entry.value().handlers.get(&kind) {
                let handler = Arc::clone(handler);
                let args = args.clone();
                tokio::spawn(async move {
                    handler(args);
                });
            }
        }
    }

    fn insert(&self, handlers: HashMap<EventKind, InternalHandler>) -> TrackingId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.entries.insert(id, TrackedEntity { handlers });
        trace!(tracking_id = id, "entity tracked");
        id
    }
}
