//! Transport - the reconnecting websocket stream.
//!
//! The transport runs in two phases, both owned by a single receive task:
//!
//! ```text
//! connect() ── handshake (inline, errors surface to the caller)
//!    │
//!    ▼
//! receive loop ── read text frames ──▶ TransportEvent::Frame
//!    │                │
//!    │ failure/close  │ watchdog recycle
//!    ▼                ▼
//! backoff (fixed) ─ fresh endpoint from the session provider ─ reconnect
//! ```
//!
//! The remote service issues time-bounded resumable tokens, so no endpoint
//! is ever reused across reconnects: every cycle asks the session provider
//! for a fresh URL. Retries have no ceiling; only disposal stops the loop.
//! Cancellation is cooperative: the lifetime token covers the whole
//! transport, each connection gets a child token, and disposal always wins
//! over a pending reconnect.

use crate::config::TransportConfig;
use crate::error::ClientError;
use crate::network::watchdog;
use async_trait::async_trait;
use futures_util::StreamExt;
use http::HeaderValue;
use http::header::{COOKIE, ORIGIN};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// External collaborator supplying the authenticated context and resumable
/// stream endpoints. Re-invoked on every reconnect because endpoints carry
/// time-bounded tokens.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// A fresh websocket endpoint URL for the event stream.
    async fn stream_endpoint(&self) -> anyhow::Result<String>;

    /// Cookie header value for the websocket handshake, if the service
    /// requires one.
    fn session_cookie(&self) -> Option<String> {
        None
    }
}

/// Lifecycle of the transport's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
    /// Terminal; reachable from any state.
    Disposed,
}

/// What the transport emits towards the session pump.
#[derive(Debug)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// A transient failure; the transport is already retrying.
    Error(anyhow::Error),
}

pub(crate) struct TransportInner {
    pub(crate) provider: Arc<dyn SessionProvider>,
    pub(crate) events: mpsc::Sender<TransportEvent>,
    pub(crate) config: TransportConfig,
    pub(crate) state: Mutex<ConnectionState>,
    pub(crate) origin: Mutex<Option<String>>,
    pub(crate) last_activity: Mutex<Instant>,
    /// Set when the watchdog forces a recovery; cleared only by a text
    /// frame, so one idle episode yields one reconnect cycle.
    pub(crate) recovering: AtomicBool,
    pub(crate) recycle: Notify,
    pub(crate) lifetime: CancellationToken,
}

impl TransportInner {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Record stream activity and re-arm the idle watchdog.
    fn touch_frame(&self) {
        *self.last_activity.lock() = Instant::now();
        self.recovering.store(false, Ordering::SeqCst);
    }

    /// Transition while the connection is still live; `Disconnected` and
    /// `Disposed` set by the owner always stick.
    fn set_state_if_live(&self, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        match *state {
            ConnectionState::Disconnected | ConnectionState::Disposed => false,
            _ => {
                *state = next;
                true
            }
        }
    }

    async fn emit_error(&self, cause: anyhow::Error) {
        let _ = self.events.send(TransportEvent::Error(cause)).await;
    }
}

/// Reconnecting full-duplex stream abstraction.
pub struct Transport {
    inner: Arc<TransportInner>,
    conn_token: Mutex<Option<CancellationToken>>,
    recv_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    watchdog_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Create the transport and start its idle watchdog. Must be called
    /// within a tokio runtime. Frames and transient errors are delivered
    /// on `events`.
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        config: TransportConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let inner = Arc::new(TransportInner {
            provider,
            events,
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            origin: Mutex::new(None),
            last_activity: Mutex::new(Instant::now()),
            recovering: AtomicBool::new(false),
            recycle: Notify::new(),
            lifetime: CancellationToken::new(),
        });
        let watchdog = watchdog::spawn(Arc::clone(&inner));
        Self {
            inner,
            conn_token: Mutex::new(None),
            recv_task: tokio::sync::Mutex::new(None),
            watchdog_task: tokio::sync::Mutex::new(Some(watchdog)),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Open the stream at `endpoint`, presenting `origin` (and the
    /// provider's session cookie) during the handshake, then start the
    /// receive loop. Handshake failures surface here; later failures are
    /// retried by the loop. A `disconnect()` or `dispose()` that lands
    /// while the handshake is in flight wins: the socket is closed and no
    /// receive loop starts.
    pub async fn connect(&self, endpoint: &str, origin: &str) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Disposed => return Err(ClientError::Disposed),
                ConnectionState::Connecting
                | ConnectionState::Open
                | ConnectionState::Reconnecting => return Err(ClientError::AlreadyConnected),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }
        *self.inner.origin.lock() = Some(origin.to_string());

        let mut socket = match open_socket(&self.inner, endpoint).await {
            Ok(socket) => socket,
            Err(cause) => {
                self.inner.set_state_if_live(ConnectionState::Disconnected);
                return Err(ClientError::Transport(cause.to_string()));
            }
        };

        let token = self.inner.lifetime.child_token();
        *self.inner.last_activity.lock() = Instant::now();
        // A deliberate connect starts a fresh idle episode.
        self.inner.recovering.store(false, Ordering::SeqCst);

        // A disconnect() or dispose() may have landed during the handshake;
        // it found nothing to cancel, so the teardown happens here. The
        // token is stored under the state lock so a disconnect that observes
        // `Open` always finds it.
        let live = {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Disconnected | ConnectionState::Disposed => false,
                _ => {
                    *state = ConnectionState::Open;
                    *self.conn_token.lock() = Some(token.clone());
                    true
                }
            }
        };
        if !live {
            let _ = socket.close(None).await;
            return match self.inner.state() {
                ConnectionState::Disposed => Err(ClientError::Disposed),
                _ => Err(ClientError::NotConnected),
            };
        }
        info!(%endpoint, "stream connected");

        let task = tokio::spawn(receive_loop(Arc::clone(&self.inner), socket, token));
        *self.recv_task.lock().await = Some(task);
        Ok(())
    }

    /// Close the stream and stop the receive loop.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock();
            match *state {
                ConnectionState::Disposed => return Err(ClientError::Disposed),
                ConnectionState::Disconnected => return Err(ClientError::NotConnected),
                _ => *state = ConnectionState::Disconnected,
            }
        }
        if let Some(token) = self.conn_token.lock().take() {
            token.cancel();
        }
        if let Some(task) = self.recv_task.lock().await.take() {
            let _ = task.await;
        }
        info!("stream disconnected");
        Ok(())
    }

    /// Permanently stop the receive loop and the watchdog. Idempotent and
    /// safe under concurrent calls; always takes precedence over a pending
    /// reconnect.
    pub async fn dispose(&self) {
        let first = {
            let mut state = self.inner.state.lock();
            let first = *state != ConnectionState::Disposed;
            *state = ConnectionState::Disposed;
            first
        };
        self.inner.lifetime.cancel();
        if let Some(task) = self.recv_task.lock().await.take() {
            let _ = task.await;
        }
        if let Some(task) = self.watchdog_task.lock().await.take() {
            let _ = task.await;
        }
        if first {
            info!("transport disposed");
        }
    }
}

async fn open_socket(inner: &Arc<TransportInner>, endpoint: &str) -> anyhow::Result<WsStream> {
    let mut request = endpoint.into_client_request()?;
    let headers = request.headers_mut();
    if let Some(origin) = inner.origin.lock().clone() {
        headers.insert(ORIGIN, HeaderValue::from_str(&origin)?);
    }
    if let Some(cookie) = inner.provider.session_cookie() {
        headers.insert(COOKIE, HeaderValue::from_str(&cookie)?);
    }
    let (socket, _response) = connect_async(request).await?;
    Ok(socket)
}

enum LoopExit {
    Cancelled,
    Closed,
    Recycle,
}

/// Owns the socket across reconnects. Runs until cancelled.
#[instrument(skip_all, name = "receive_loop")]
async fn receive_loop(inner: Arc<TransportInner>, socket: WsStream, token: CancellationToken) {
    let mut socket = Some(socket);
    loop {
        let stream = match socket.take() {
            Some(stream) => stream,
            None => match reopen(&inner, &token).await {
                Some(stream) => stream,
                None => break,
            },
        };
        match read_frames(&inner, stream, &token).await {
            LoopExit::Cancelled => break,
            LoopExit::Closed => {
                inner.set_state_if_live(ConnectionState::Reconnecting);
                if backoff(&inner, &token).await.is_none() {
                    break;
                }
            }
            LoopExit::Recycle => {
                // Forced disconnect+connect; no backoff, the endpoint is
                // fetched fresh immediately.
                inner.set_state_if_live(ConnectionState::Reconnecting);
            }
        }
    }
    debug!("receive loop stopped");
}

/// Fixed-delay wait, interruptible by cancellation.
async fn backoff(inner: &Arc<TransportInner>, token: &CancellationToken) -> Option<()> {
    tokio::select! {
        biased;
        () = token.cancelled() => None,
        () = tokio::time::sleep(inner.config.reconnect_backoff()) => Some(()),
    }
}

/// Ask the provider for a fresh endpoint and open it, retrying with the
/// fixed backoff until it succeeds or the connection is cancelled.
async fn reopen(inner: &Arc<TransportInner>, token: &CancellationToken) -> Option<WsStream> {
    loop {
        if token.is_cancelled() {
            return None;
        }
        let endpoint = tokio::select! {
            biased;
            () = token.cancelled() => return None,
            endpoint = inner.provider.stream_endpoint() => match endpoint {
                Ok(endpoint) => endpoint,
                Err(cause) => {
                    warn!(error = %cause, "session provider failed to supply an endpoint");
                    inner.emit_error(cause).await;
                    backoff(inner, token).await?;
                    continue;
                }
            },
        };
        match open_socket(inner, &endpoint).await {
            Ok(stream) => {
                if !inner.set_state_if_live(ConnectionState::Open) {
                    return None;
                }
                *inner.last_activity.lock() = Instant::now();
                info!(%endpoint, "stream reconnected");
                return Some(stream);
            }
            Err(cause) => {
                warn!(error = %cause, "reconnect attempt failed");
                inner.emit_error(cause).await;
                backoff(inner, token).await?;
            }
        }
    }
}

/// Read frames until the socket closes, the watchdog requests a recycle,
/// or the connection is cancelled.
async fn read_frames(
    inner: &Arc<TransportInner>,
    mut socket: WsStream,
    token: &CancellationToken,
) -> LoopExit {
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                let _ = socket.close(None).await;
                return LoopExit::Cancelled;
            }
            () = inner.recycle.notified() => {
                let _ = socket.close(None).await;
                return LoopExit::Recycle;
            }
            frame = socket.next() => match frame {
                Some(Ok(WsMessage::Text(payload))) => {
                    inner.touch_frame();
                    if inner.events.send(TransportEvent::Frame(payload)).await.is_err() {
                        // Receiver gone: the session dropped its pump.
                        return LoopExit::Cancelled;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!("stream closed by remote");
                    return LoopExit::Closed;
                }
                // Non-text frames carry nothing for the event feed.
                Some(Ok(_)) => {}
                Some(Err(cause)) => {
                    warn!(error = %cause, "stream read failed");
                    inner.emit_error(cause.into()).await;
                    return LoopExit::Closed;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoProvider;

    #[async_trait]
    impl SessionProvider for NoProvider {
        async fn stream_endpoint(&self) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("no endpoint in tests"))
        }
    }

    fn transport() -> (Transport, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(8);
        (
            Transport::new(Arc::new(NoProvider), TransportConfig::default(), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn disconnect_without_connection_fails() {
        let (transport, _rx) = transport();
        assert!(matches!(
            transport.disconnect().await,
            Err(ClientError::NotConnected)
        ));
        transport.dispose().await;
    }

    #[tokio::test]
    async fn dispose_is_idempotent_and_terminal() {
        let (transport, _rx) = transport();
        transport.dispose().await;
        transport.dispose().await;
        assert_eq!(transport.state(), ConnectionState::Disposed);
        assert!(matches!(
            transport.connect("ws://127.0.0.1:1/", "http://example").await,
            Err(ClientError::Disposed)
        ));
        assert!(matches!(
            transport.disconnect().await,
            Err(ClientError::Disposed)
        ));
    }
}
