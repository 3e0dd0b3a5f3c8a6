//! Listener contract registry.
//!
//! External callbacks are registered per event kind and validated
//! structurally at registration time: the listener is a tagged union of the
//! supported per-kind shapes, so a shape/kind mismatch is rejected with the
//! human-readable expected signature before it can ever be invoked with the
//! wrong arguments. Registration keys ascend per kind; duplicate instances
//! (same `Arc`) are rejected.

use crate::error::ClientError;
use crate::event::{EventArgs, EventKind, Signature};
use crate::state::{AccessLevel, ChatMessage, ChatUser, MessageId, Room};
use anyhow::anyhow;
use dashmap::DashMap;
use std::sync::Arc;

type Cb1<A> = Arc<dyn Fn(A) -> anyhow::Result<()> + Send + Sync>;
type Cb2<A, B> = Arc<dyn Fn(A, B) -> anyhow::Result<()> + Send + Sync>;
type Cb4<A, B, C, D> = Arc<dyn Fn(A, B, C, D) -> anyhow::Result<()> + Send + Sync>;

/// An external callback, tagged with its shape.
///
/// Cloning a `Listener` clones the `Arc`, not the callback: clones of the
/// same listener count as the same instance for duplicate detection and for
/// `disconnect_listener`.
#[derive(Clone)]
pub enum Listener {
    Message(Cb1<Arc<ChatMessage>>),
    MessageUser(Cb2<Arc<ChatMessage>, Arc<ChatUser>>),
    UserMessageId(Cb2<Arc<ChatUser>, MessageId>),
    User(Cb1<Arc<ChatUser>>),
    UserAccess(Cb2<Arc<ChatUser>, AccessLevel>),
    Room(Cb1<Arc<Room>>),
    Star(Cb4<Arc<ChatMessage>, Arc<ChatUser>, u32, u32>),
    Error(Cb1<Arc<anyhow::Error>>),
    Raw(Cb1<String>),
}

impl Listener {
    pub fn on_message<F>(f: F) -> Self
    where
        F: Fn(Arc<ChatMessage>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Message(Arc::new(f))
    }

    pub fn on_message_user<F>(f: F) -> Self
    where
        F: Fn(Arc<ChatMessage>, Arc<ChatUser>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::MessageUser(Arc::new(f))
    }

    pub fn on_deletion<F>(f: F) -> Self
    where
        F: Fn(Arc<ChatUser>, MessageId) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::UserMessageId(Arc::new(f))
    }

    pub fn on_user<F>(f: F) -> Self
    where
        F: Fn(Arc<ChatUser>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::User(Arc::new(f))
    }

    pub fn on_access<F>(f: F) -> Self
    where
        F: Fn(Arc<ChatUser>, AccessLevel) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::UserAccess(Arc::new(f))
    }

    pub fn on_room<F>(f: F) -> Self
    where
        F: Fn(Arc<Room>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Room(Arc::new(f))
    }

    pub fn on_star<F>(f: F) -> Self
    where
        F: Fn(Arc<ChatMessage>, Arc<ChatUser>, u32, u32) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self::Star(Arc::new(f))
    }

    pub fn on_error<F>(f: F) -> Self
    where
        F: Fn(Arc<anyhow::Error>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Error(Arc::new(f))
    }

    pub fn on_raw<F>(f: F) -> Self
    where
        F: Fn(String) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::Raw(Arc::new(f))
    }

    /// The shape of this callback.
    pub fn signature(&self) -> Signature {
        match self {
            Self::Message(_) => Signature::Message,
            Self::MessageUser(_) => Signature::MessageUser,
            Self::UserMessageId(_) => Signature::UserMessageId,
            Self::User(_) => Signature::User,
            Self::UserAccess(_) => Signature::UserAccess,
            Self::Room(_) => Signature::Room,
            Self::Star(_) => Signature::Star,
            Self::Error(_) => Signature::Error,
            Self::Raw(_) => Signature::Raw,
        }
    }

    /// Whether `other` is the exact same callback instance.
    pub fn same_callback(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Message(a), Self::Message(b)) => Arc::ptr_eq(a, b),
            (Self::MessageUser(a), Self::MessageUser(b)) => Arc::ptr_eq(a, b),
            (Self::UserMessageId(a), Self::UserMessageId(b)) => Arc::ptr_eq(a, b),
            (Self::User(a), Self::User(b)) => Arc::ptr_eq(a, b),
            (Self::UserAccess(a), Self::UserAccess(b)) => Arc::ptr_eq(a, b),
            (Self::Room(a), Self::Room(b)) => Arc::ptr_eq(a, b),
            (Self::Star(a), Self::Star(b)) => Arc::ptr_eq(a, b),
            (Self::Error(a), Self::Error(b)) => Arc::ptr_eq(a, b),
            (Self::Raw(a), Self::Raw(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Invoke the callback with a typed argument tuple.
    ///
    /// The registry only ever pairs a listener with arguments of its own
    /// shape; the residual arm is a consistency guard, not a designed path.
    pub(crate) fn invoke(&self, args: EventArgs) -> anyhow::Result<()> {
        match (self, args) {
            (Self::Message(f), EventArgs::Message(m)) => f(m),
            (Self::MessageUser(f), EventArgs::MessageUser(m, u)) => f(m, u),
            (Self::UserMessageId(f), EventArgs::UserMessageId(u, id)) => f(u, id),
            (Self::User(f), EventArgs::User(u)) => f(u),
            (Self::UserAccess(f), EventArgs::UserAccess(u, a)) => f(u, a),
            (Self::Room(f), EventArgs::Room(r)) => f(r),
            (Self::Star(f), EventArgs::Star(m, u, s, p)) => f(m, u, s, p),
            (Self::Error(f), EventArgs::Error(e)) => f(e),
            (Self::Raw(f), EventArgs::Raw(raw)) => f(raw),
            (listener, args) => Err(anyhow!(ClientError::InternalConsistency(
                "listener invoked with mismatched argument shape"
            ))
            .context(format!(
                "listener {:?} vs args {:?}",
                listener.signature(),
                args.signature()
            ))),
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Listener({:?})", self.signature())
    }
}

struct KindSet {
    next_key: u64,
    entries: Vec<(u64, Listener)>,
}

/// Per-kind ordered sets of registered callbacks.
#[derive(Default)]
pub struct ListenerRegistry {
    sets: DashMap<EventKind, KindSet>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `kind`. Returns the ascending key the entry
    /// was appended under, scoped to that kind.
    pub fn connect(&self, kind: EventKind, listener: Listener) -> Result<u64, ClientError> {
        let Some(expected) = kind.signature_text() else {
            return Err(ClientError::ArgumentInvalid(format!(
                "{kind:?} is reserved and never dispatched"
            )));
        };
        if Some(listener.signature()) != kind.signature() {
            return Err(ClientError::SignatureMismatch { kind, expected });
        }

        let mut set = self.sets.entry(kind).or_insert_with(|| KindSet {
            next_key: 0,
            entries: Vec::new(),
        });
        if set.entries.iter().any(|(_, l)| l.same_callback(&listener)) {
            return Err(ClientError::DuplicateRegistration(kind));
        }
        let key = set.next_key;
        set.next_key += 1;
        set.entries.push((key, listener));
        Ok(key)
    }

    /// Remove the exact callback instance registered for `kind`.
    pub fn disconnect(&self, kind: EventKind, listener: &Listener) -> Result<(), ClientError> {
        let mut set = self.sets.get_mut(&kind).ok_or(ClientError::NotFound(kind))?;
        let index = set
            .entries
            .iter()
            .position(|(_, l)| l.same_callback(listener))
            .ok_or(ClientError::NotFound(kind))?;
        set.entries.remove(index);
        Ok(())
    }

    /// Clone out the current registration order for `kind`.
    pub(crate) fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        self.sets
            .get(&kind)
            .map(|set| set.entries.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of callbacks registered for `kind`.
    pub fn count(&self, kind: EventKind) -> usize {
        self.sets.get(&kind).map_or(0, |set| set.entries.len())
    }
}
