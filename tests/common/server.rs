//! In-process websocket feed server.
//!
//! Accepts any number of connections, broadcasts pushed frames to all of
//! them, and can drop every open connection on demand to simulate the
//! remote feed dying without a close handshake.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Notify, broadcast};
use tokio_tungstenite::tungstenite::Message;

pub struct FeedServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

struct ServerState {
    frames: broadcast::Sender<String>,
    drop_all: Notify,
    accepted: AtomicUsize,
    handshake_delay: Duration,
}

impl FeedServer {
    pub async fn spawn() -> Self {
        Self::with_handshake_delay(Duration::ZERO).await
    }

    /// A server that stalls every websocket handshake, for exercising
    /// races against a connect in flight.
    pub async fn with_handshake_delay(handshake_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind feed server");
        let addr = listener.local_addr().expect("feed server addr");
        let (frames, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            frames,
            drop_all: Notify::new(),
            accepted: AtomicUsize::new(0),
            handshake_delay,
        });

        let accept_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = Arc::clone(&accept_state);
                tokio::spawn(serve_connection(state, stream));
            }
        });

        Self { addr, state }
    }

    /// Endpoint clients should dial; the server ignores path and query.
    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    /// Broadcast one text frame to every open connection.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.state.frames.send(frame.into());
    }

    /// Drop every open connection without a close handshake.
    pub fn drop_connections(&self) {
        self.state.drop_all.notify_waiters();
    }

    /// Total connections accepted since the server started.
    pub fn accepted(&self) -> usize {
        self.state.accepted.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` connections have been accepted.
    pub async fn wait_for_accepted(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.accepted() < n {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| {
            panic!(
                "feed server saw {} connections, expected {n}",
                self.accepted()
            )
        });
    }
}

async fn serve_connection(state: Arc<ServerState>, stream: tokio::net::TcpStream) {
    if !state.handshake_delay.is_zero() {
        tokio::time::sleep(state.handshake_delay).await;
    }
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    state.accepted.fetch_add(1, Ordering::SeqCst);
    let mut frames = state.frames.subscribe();
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            // Tear the TCP stream down with no close frame.
            () = state.drop_all.notified() => break,
            incoming = ws.next() => match incoming {
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}
