//! backchat - resilient chat-session client runtime.
//!
//! The crate is the core of a chat client that stays attached to a room's
//! event stream for days at a time:
//!
//! - [`network`]: a reconnecting websocket transport. Every reconnect asks
//!   the injected [`SessionProvider`] for a fresh endpoint because stream
//!   URLs carry time-bounded resumable tokens; an idle watchdog forces a
//!   cycle when the feed goes silent without the socket erroring.
//! - [`queue`]: a single-consumer action queue that strictly serializes
//!   outgoing writes, FIFO or weighted by an optional priority table.
//! - [`event`]: a per-kind listener registry with typed callback contracts
//!   and a dispatcher that fans each event out to tracked entities and
//!   external listeners on spawned tasks.
//! - [`state`]: message, user, and room entities that self-update from the
//!   stream while tracked.
//! - [`session`]: the [`ChatSession`] facade wiring all of the above to an
//!   injected frame decoder and content extractor.
//!
//! ```no_run
//! use backchat::{ChatSession, ClientConfig, EventKind, Listener};
//! # use backchat::{ContentExtractor, FrameDecoder, SessionProvider};
//! # async fn run(
//! #     provider: std::sync::Arc<dyn SessionProvider>,
//! #     decoder: std::sync::Arc<dyn FrameDecoder>,
//! #     extractor: std::sync::Arc<dyn ContentExtractor>,
//! # ) -> anyhow::Result<()> {
//! let session = ChatSession::new(ClientConfig::default(), provider, decoder, extractor, 42);
//! session.connect_listener(
//!     EventKind::MessagePosted,
//!     Listener::on_message(|message| {
//!         println!("{}", message.content());
//!         Ok(())
//!     }),
//! )?;
//! session.connect("wss://chat.example/events?token=...", "https://chat.example").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod handlers;
pub mod network;
pub mod queue;
pub mod session;
pub mod state;

pub use config::{ClientConfig, ConfigError, QueueConfig, TransportConfig};
pub use error::ClientError;
pub use event::{Dispatcher, EventArgs, EventKind, Listener, Signature};
pub use handlers::FieldMap;
pub use network::{ConnectionState, SessionProvider, Transport, TransportEvent};
pub use queue::{ActionOp, ActionOutcome, ActionQueue, ActionResult, ActionType, action};
pub use session::{ChatSession, ContentExtractor, FrameDecoder};
pub use state::{
    AccessLevel, ChatMessage, ChatUser, MessageId, Room, RoomId, TrackingId, UserId,
};
