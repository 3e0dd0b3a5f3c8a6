//! Domain state: the live objects a session keeps self-consistent.

mod message;
mod room;
mod tracker;
mod user;

pub use message::ChatMessage;
pub use room::Room;
pub use tracker::{EntityTracker, TrackingId};
pub use user::{AccessLevel, ChatUser};

/// Identifier of a chat message.
pub type MessageId = u64;
/// Identifier of a user account.
pub type UserId = u64;
/// Identifier of a chat room.
pub type RoomId = u64;
