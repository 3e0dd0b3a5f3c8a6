//! Event dispatcher.
//!
//! Fans one decoded event out to (1) every tracked entity holding an
//! internal handler for the kind and (2) every externally registered
//! listener, each invocation on its own spawned task so ingestion never
//! blocks on a slow callback. Listener errors are captured and re-delivered
//! as exactly one `InternalException` event; an error inside an
//! `InternalException` listener itself is only logged, which breaks the
//! recursion.

use crate::event::{EventArgs, EventKind, Listener, ListenerRegistry};
use crate::state::{ChatMessage, ChatUser, EntityTracker, Room, TrackingId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// Shared event dispatcher. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    listeners: ListenerRegistry,
    tracker: EntityTracker,
    /// When set, externally registered listeners are skipped for events the
    /// session's own identity caused. Internal handlers always run.
    ignore_own_events: AtomicBool,
}

impl Dispatcher {
    pub fn new(ignore_own_events: bool) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                listeners: ListenerRegistry::new(),
                tracker: EntityTracker::new(),
                ignore_own_events: AtomicBool::new(ignore_own_events),
            }),
        }
    }

    /// The per-kind listener contract registry.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.inner.listeners
    }

    pub fn ignore_own_events(&self) -> bool {
        self.inner.ignore_own_events.load(Ordering::SeqCst)
    }

    pub fn set_ignore_own_events(&self, ignore: bool) {
        self.inner.ignore_own_events.store(ignore, Ordering::SeqCst);
    }

    /// Track a message so it self-updates from matching events.
    pub fn track_message(&self, message: &Arc<ChatMessage>) -> TrackingId {
        self.inner.tracker.track_message(message)
    }

    /// Track a user so it self-updates from matching events.
    pub fn track_user(&self, user: &Arc<ChatUser>) -> TrackingId {
        self.inner.tracker.track_user(user)
    }

    /// Track a room so it self-updates from matching events.
    pub fn track_room(&self, room: &Arc<Room>) -> TrackingId {
        self.inner.tracker.track_room(room)
    }

    /// Stop self-updates for a tracked entity. Unknown ids are a no-op.
    pub fn untrack(&self, id: TrackingId) {
        self.inner.tracker.untrack(id);
    }

    /// Fan one event out to tracked entities and external listeners.
    ///
    /// `self_caused` marks events whose acting identity is the session's
    /// own. Internal handlers are always notified; external listeners are
    /// skipped for self-caused events while `ignore_own_events` is set.
    /// Returns immediately; all invocations run on spawned tasks with no
    /// defined completion ordering across events.
    pub fn call_listeners(&self, kind: EventKind, self_caused: bool, args: EventArgs) {
        self.inner.tracker.notify(kind, &args);

        if self_caused && self.ignore_own_events() {
            debug!(?kind, "suppressing external fan-out for self-caused event");
            return;
        }

        for listener in self.inner.listeners.snapshot(kind) {
            self.spawn_invocation(kind, listener, args.clone());
        }
    }

    fn spawn_invocation(&self, kind: EventKind, listener: Listener, args: EventArgs) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            if let Err(cause) = listener.invoke(args) {
                if kind == EventKind::InternalException {
                    // An exception listener failing on an exception event
                    // must not feed back into itself.
                    error!(error = %cause, "internal-exception listener failed");
                    return;
                }
                debug!(?kind, error = %cause, "listener failed, re-emitting as event");
                dispatcher.call_listeners(
                    EventKind::InternalException,
                    false,
                    EventArgs::Error(Arc::new(cause)),
                );
            }
        });
    }
}
