//! Chat session facade.
//!
//! [`ChatSession`] owns the full runtime: the reconnecting transport, the
//! pump task that decodes incoming frames and fans them out through the
//! dispatcher, and the single-consumer action queue for outgoing writes.
//! The decoder, the content extractor, and the session provider are
//! injected so the core stays independent of any concrete service API.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::{Dispatcher, EventArgs, EventKind, Listener};
use crate::handlers::{FieldMap, HandlerContext, HandlerRegistry};
use crate::network::{ConnectionState, SessionProvider, Transport, TransportEvent};
use crate::queue::{ActionOp, ActionQueue, ActionResult, ActionType};
use crate::state::{ChatMessage, ChatUser, MessageId, Room, TrackingId, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Parses one raw text frame into per-event field maps.
///
/// Decoding is pure and synchronous; a frame may carry several events and a
/// malformed frame simply yields fewer (or zero) entries.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, raw: &str) -> Vec<(EventKind, FieldMap)>;
}

/// Fetches a message body out-of-band when a frame omits it.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn message_content(&self, id: MessageId) -> anyhow::Result<String>;
}

/// A persistent connection to one chat room's event stream.
pub struct ChatSession {
    transport: Transport,
    dispatcher: Dispatcher,
    queue: ActionQueue,
    disposed: AtomicBool,
    stop: CancellationToken,
    pump: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    /// Build the session runtime and start its pump and queue consumer.
    /// Must be called within a tokio runtime; nothing connects until
    /// [`connect`](Self::connect).
    pub fn new(
        config: ClientConfig,
        provider: Arc<dyn SessionProvider>,
        decoder: Arc<dyn FrameDecoder>,
        extractor: Arc<dyn ContentExtractor>,
        own_user_id: UserId,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        let transport = Transport::new(provider, config.transport, events_tx);
        let dispatcher = Dispatcher::new(config.ignore_own_events);
        let queue = ActionQueue::new(&config.queue);
        let stop = CancellationToken::new();

        let pump = tokio::spawn(pump_loop(
            events_rx,
            decoder,
            dispatcher.clone(),
            HandlerContext {
                own_user_id,
                extractor,
            },
            stop.clone(),
        ));

        Self {
            transport,
            dispatcher,
            queue,
            disposed: AtomicBool::new(false),
            stop,
            pump: tokio::sync::Mutex::new(Some(pump)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Open the event stream at `endpoint`, presenting `origin` during the
    /// handshake. Fails fast on a bad handshake; once open, the transport
    /// retries later failures on its own.
    pub async fn connect(&self, endpoint: &str, origin: &str) -> Result<(), ClientError> {
        self.transport.connect(endpoint, origin).await
    }

    /// Close the event stream. Listeners, tracked entities, and the queue
    /// stay intact for a later reconnect.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.transport.disconnect().await
    }

    /// Register `listener` for `kind`. The listener's shape must match the
    /// kind's contract; duplicate callbacks for the same kind are rejected,
    /// as is any registration on a disposed session.
    pub fn connect_listener(&self, kind: EventKind, listener: Listener) -> Result<u64, ClientError> {
        self.guard_disposed()?;
        self.dispatcher.listeners().connect(kind, listener)
    }

    /// Remove a previously registered callback. Clones of the same
    /// listener count as the same instance.
    pub fn disconnect_listener(&self, kind: EventKind, listener: &Listener) -> Result<(), ClientError> {
        self.dispatcher.listeners().disconnect(kind, listener)
    }

    /// Track `message` so it self-updates from edit, delete, and star
    /// events. Fails on a disposed session.
    pub fn track_message(&self, message: &Arc<ChatMessage>) -> Result<TrackingId, ClientError> {
        self.guard_disposed()?;
        Ok(self.dispatcher.track_message(message))
    }

    /// Track `user` so it self-updates from access-level events. Fails on
    /// a disposed session.
    pub fn track_user(&self, user: &Arc<ChatUser>) -> Result<TrackingId, ClientError> {
        self.guard_disposed()?;
        Ok(self.dispatcher.track_user(user))
    }

    /// Track `room` so it self-updates from metadata events. Fails on a
    /// disposed session.
    pub fn track_room(&self, room: &Arc<Room>) -> Result<TrackingId, ClientError> {
        self.guard_disposed()?;
        Ok(self.dispatcher.track_room(room))
    }

    fn guard_disposed(&self) -> Result<(), ClientError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::Disposed);
        }
        Ok(())
    }

    /// Stop self-updates for a tracked entity. Unknown ids are a no-op.
    pub fn untrack(&self, id: TrackingId) {
        self.dispatcher.untrack(id);
    }

    /// Submit an outgoing operation and await its outcome. Operations are
    /// strictly serialized by the queue's single consumer.
    pub async fn submit(&self, kind: ActionType, op: ActionOp) -> ActionResult {
        self.queue.submit(kind, op).await
    }

    pub fn ignore_own_events(&self) -> bool {
        self.dispatcher.ignore_own_events()
    }

    pub fn set_ignore_own_events(&self, ignore: bool) {
        self.dispatcher.set_ignore_own_events(ignore);
    }

    /// The event dispatcher, for direct fan-out in embedding code.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Tear the session down: the queue stops accepting work, the stream
    /// closes for good, and the pump drains. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!("session already disposed");
        }
        self.queue.dispose().await;
        self.transport.dispose().await;
        self.stop.cancel();
        if let Some(pump) = self.pump.lock().await.take() {
            let _ = pump.await;
        }
    }
}

/// Drains transport events: every text frame is published raw as
/// `DataReceived` first, then decoded and converted kind by kind. A frame
/// that fails conversion is logged and skipped; it never stops the pump.
#[instrument(skip_all, name = "session_pump")]
async fn pump_loop(
    mut events: mpsc::Receiver<TransportEvent>,
    decoder: Arc<dyn FrameDecoder>,
    dispatcher: Dispatcher,
    ctx: HandlerContext,
    stop: CancellationToken,
) {
    let registry = HandlerRegistry::new();
    loop {
        let event = tokio::select! {
            biased;
            () = stop.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        match event {
            TransportEvent::Frame(raw) => {
                dispatcher.call_listeners(
                    EventKind::DataReceived,
                    false,
                    EventArgs::Raw(raw.clone()),
                );
                for (kind, fields) in decoder.decode(&raw) {
                    match registry.convert(&ctx, kind, &fields).await {
                        Ok(Some(dispatch)) => {
                            dispatcher.call_listeners(kind, dispatch.self_caused, dispatch.args);
                        }
                        Ok(None) => {}
                        Err(cause) => {
                            warn!(?kind, error = %cause, "dropping undecodable event");
                        }
                    }
                }
            }
            TransportEvent::Error(cause) => {
                warn!(error = %cause, "transport reported a transient failure");
            }
        }
    }
    debug!("pump stopped");
}
