//! Event model: the closed set of chat-level occurrences and their
//! per-kind dispatch contracts.
//!
//! Every event kind carries a fixed signature (arity plus ordered argument
//! types). Listener registration is validated structurally against that
//! contract instead of via dynamic inspection: both the listener and the
//! dispatch arguments are tagged unions over the small set of supported
//! shapes.

mod dispatcher;
mod listener;

pub use dispatcher::Dispatcher;
pub use listener::{Listener, ListenerRegistry};

use crate::state::{AccessLevel, ChatMessage, ChatUser, MessageId, Room};
use std::sync::Arc;

/// Closed enumeration of chat-level occurrences.
///
/// Wire codes follow the remote service's event feed. Kinds marked
/// *reserved* are historical placeholder values with no decoder and no
/// listener contract: they stay enumerable but inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Exception raised inside a listener, re-delivered as an event.
    /// Client-side pseudo kind; never decoded from a frame.
    InternalException,
    MessagePosted,
    MessageEdited,
    UserEntered,
    UserLeft,
    RoomMetaChanged,
    MessageStarToggled,
    /// Raw frame payload, emitted before decoding.
    DataReceived,
    UserMentioned,
    /// Reserved.
    MessageFlagged,
    MessageDeleted,
    /// Reserved.
    FileAdded,
    /// Reserved.
    ModeratorFlag,
    /// Reserved.
    UserSettingsChanged,
    /// Reserved.
    GlobalNotification,
    AccessLevelChanged,
    /// Reserved.
    UserNotification,
    /// Reserved.
    Invitation,
    MessageReply,
    MessageMovedOut,
    MessageMovedIn,
    /// Reserved.
    TimeBreak,
    /// Reserved.
    FeedTicker,
    /// Reserved.
    UserSuspended,
    /// Reserved.
    UserMerged,
}

impl EventKind {
    /// Numeric code used by the remote event feed.
    pub fn code(self) -> u16 {
        match self {
            Self::InternalException => 0,
            Self::MessagePosted => 1,
            Self::MessageEdited => 2,
            Self::UserEntered => 3,
            Self::UserLeft => 4,
            Self::RoomMetaChanged => 5,
            Self::MessageStarToggled => 6,
            Self::DataReceived => 7,
            Self::UserMentioned => 8,
            Self::MessageFlagged => 9,
            Self::MessageDeleted => 10,
            Self::FileAdded => 11,
            Self::ModeratorFlag => 12,
            Self::UserSettingsChanged => 13,
            Self::GlobalNotification => 14,
            Self::AccessLevelChanged => 15,
            Self::UserNotification => 16,
            Self::Invitation => 17,
            Self::MessageReply => 18,
            Self::MessageMovedOut => 19,
            Self::MessageMovedIn => 20,
            Self::TimeBreak => 21,
            Self::FeedTicker => 22,
            Self::UserSuspended => 29,
            Self::UserMerged => 30,
        }
    }

    /// Resolve a wire code back to a kind. Unknown codes are dropped by
    /// decoders.
    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            0 => Self::InternalException,
            1 => Self::MessagePosted,
            2 => Self::MessageEdited,
            3 => Self::UserEntered,
            4 => Self::UserLeft,
            5 => Self::RoomMetaChanged,
            6 => Self::MessageStarToggled,
            7 => Self::DataReceived,
            8 => Self::UserMentioned,
            9 => Self::MessageFlagged,
            10 => Self::MessageDeleted,
            11 => Self::FileAdded,
            12 => Self::ModeratorFlag,
            13 => Self::UserSettingsChanged,
            14 => Self::GlobalNotification,
            15 => Self::AccessLevelChanged,
            16 => Self::UserNotification,
            17 => Self::Invitation,
            18 => Self::MessageReply,
            19 => Self::MessageMovedOut,
            20 => Self::MessageMovedIn,
            21 => Self::TimeBreak,
            22 => Self::FeedTicker,
            29 => Self::UserSuspended,
            30 => Self::UserMerged,
            _ => return None,
        })
    }

    /// The declared dispatch contract for this kind, or `None` for
    /// reserved kinds that are never dispatched.
    pub fn signature(self) -> Option<Signature> {
        Some(match self {
            Self::MessagePosted
            | Self::MessageEdited
            | Self::MessageMovedIn
            | Self::MessageMovedOut => Signature::Message,
            Self::UserMentioned | Self::MessageReply => Signature::MessageUser,
            Self::MessageDeleted => Signature::UserMessageId,
            Self::UserEntered | Self::UserLeft => Signature::User,
            Self::AccessLevelChanged => Signature::UserAccess,
            Self::RoomMetaChanged => Signature::Room,
            Self::MessageStarToggled => Signature::Star,
            Self::InternalException => Signature::Error,
            Self::DataReceived => Signature::Raw,
            Self::MessageFlagged
            | Self::FileAdded
            | Self::ModeratorFlag
            | Self::UserSettingsChanged
            | Self::GlobalNotification
            | Self::UserNotification
            | Self::Invitation
            | Self::TimeBreak
            | Self::FeedTicker
            | Self::UserSuspended
            | Self::UserMerged => return None,
        })
    }

    /// Human-readable form of the declared contract, used in
    /// `SignatureMismatch` errors.
    pub fn signature_text(self) -> Option<&'static str> {
        Some(match self {
            Self::MessagePosted => "MessagePosted(Message)",
            Self::MessageEdited => "MessageEdited(Message)",
            Self::MessageMovedIn => "MessageMovedIn(Message)",
            Self::MessageMovedOut => "MessageMovedOut(Message)",
            Self::UserMentioned => "UserMentioned(Message, User)",
            Self::MessageReply => "MessageReply(Message, User)",
            Self::MessageDeleted => "MessageDeleted(User, MessageId)",
            Self::UserEntered => "UserEntered(User)",
            Self::UserLeft => "UserLeft(User)",
            Self::AccessLevelChanged => "AccessLevelChanged(User, AccessLevel)",
            Self::RoomMetaChanged => "RoomMetaChanged(Room)",
            Self::MessageStarToggled => "MessageStarToggled(Message, User, u32, u32)",
            Self::InternalException => "InternalException(Error)",
            Self::DataReceived => "DataReceived(String)",
            _ => return None,
        })
    }

    /// Whether this kind is a reserved placeholder with no dispatch
    /// contract.
    pub fn is_reserved(self) -> bool {
        self.signature().is_none()
    }
}

/// Structural type tag for a per-kind callback contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signature {
    /// `(Message)`
    Message,
    /// `(Message, User)`
    MessageUser,
    /// `(User, MessageId)`
    UserMessageId,
    /// `(User)`
    User,
    /// `(User, AccessLevel)`
    UserAccess,
    /// `(Room)`
    Room,
    /// `(Message, User, stars, pins)`
    Star,
    /// `(Error)`
    Error,
    /// `(String)` - raw frame payload
    Raw,
}

/// Typed argument tuple for one event dispatch.
///
/// Cheap to clone: entities are shared `Arc`s, scalars are copied. One clone
/// is handed to every spawned listener invocation.
#[derive(Clone)]
pub enum EventArgs {
    Message(Arc<ChatMessage>),
    MessageUser(Arc<ChatMessage>, Arc<ChatUser>),
    UserMessageId(Arc<ChatUser>, MessageId),
    User(Arc<ChatUser>),
    UserAccess(Arc<ChatUser>, AccessLevel),
    Room(Arc<Room>),
    Star(Arc<ChatMessage>, Arc<ChatUser>, u32, u32),
    Error(Arc<anyhow::Error>),
    Raw(String),
}

impl EventArgs {
    /// The shape of this argument tuple.
    pub fn signature(&self) -> Signature {
        match self {
            Self::Message(_) => Signature::Message,
            Self::MessageUser(..) => Signature::MessageUser,
            Self::UserMessageId(..) => Signature::UserMessageId,
            Self::User(_) => Signature::User,
            Self::UserAccess(..) => Signature::UserAccess,
            Self::Room(_) => Signature::Room,
            Self::Star(..) => Signature::Star,
            Self::Error(_) => Signature::Error,
            Self::Raw(_) => Signature::Raw,
        }
    }
}

impl std::fmt::Debug for EventArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(m) => write!(f, "Message(#{})", m.id()),
            Self::MessageUser(m, u) => write!(f, "MessageUser(#{}, #{})", m.id(), u.id()),
            Self::UserMessageId(u, id) => write!(f, "UserMessageId(#{}, #{id})", u.id()),
            Self::User(u) => write!(f, "User(#{})", u.id()),
            Self::UserAccess(u, a) => write!(f, "UserAccess(#{}, {a:?})", u.id()),
            Self::Room(r) => write!(f, "Room(#{})", r.id()),
            Self::Star(m, u, s, p) => write!(f, "Star(#{}, #{}, {s}, {p})", m.id(), u.id()),
            Self::Error(e) => write!(f, "Error({e})"),
            Self::Raw(raw) => write!(f, "Raw({} bytes)", raw.len()),
        }
    }
}
