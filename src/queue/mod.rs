//! Action queue executor.
//!
//! Every outgoing mutating operation against the remote service funnels
//! through one queue with exactly one consumer task, so writes are strictly
//! serialized even though many callers submit concurrently. Each submitter
//! awaits its own oneshot result; an operation's error propagates to its
//! submitter and to nobody else.
//!
//! Selection is FIFO by ascending sequence key unless a priority table is
//! configured, in which case the consumer scans weights in descending order
//! and runs the lowest-sequence pending action of the first type present.
//! A table that matches none of the pending types falls back to FIFO rather
//! than deadlocking.

use crate::config::QueueConfig;
use crate::error::ClientError;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Priority class of an outgoing operation. The operation body itself is
/// opaque to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    PostMessage,
    EditMessage,
    DeleteMessage,
    ToggleStar,
    TogglePin,
    KickMute,
    SetAccess,
}

/// Outcome of an executed action, as reported by the remote service.
pub type ActionOutcome = serde_json::Value;

/// Result delivered to the submitting caller.
pub type ActionResult = anyhow::Result<ActionOutcome>;

/// An opaque executable unit: called once by the consumer, runs to
/// completion before the next action is considered.
pub type ActionOp = Box<dyn FnOnce() -> BoxFuture<'static, ActionResult> + Send>;

/// Box an async closure into an [`ActionOp`].
pub fn action<F, Fut>(f: F) -> ActionOp
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ActionResult> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

struct QueuedAction {
    kind: ActionType,
    op: ActionOp,
    done: oneshot::Sender<ActionResult>,
}

struct QueueInner {
    pending: Mutex<BTreeMap<u64, QueuedAction>>,
    next_seq: AtomicU64,
    /// Weights sorted descending, fixed at construction.
    priorities: Vec<(ActionType, u32)>,
    poll_interval: std::time::Duration,
    stop: CancellationToken,
    disposed: AtomicBool,
}

impl QueueInner {
    /// Pick the next action under the pending lock. Priority scan first,
    /// FIFO fallback; with a single consumer this covers every reachable
    /// case, so there is no designed no-match error path.
    fn take_next(&self) -> Option<QueuedAction> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return None;
        }
        for (kind, _) in &self.priorities {
            let found = pending
                .iter()
                .find(|(_, action)| action.kind == *kind)
                .map(|(seq, _)| *seq);
            if let Some(seq) = found {
                return pending.remove(&seq);
            }
        }
        let seq = *pending.keys().next()?;
        pending.remove(&seq)
    }
}

/// Single-consumer serialization point for outgoing mutating operations.
pub struct ActionQueue {
    inner: Arc<QueueInner>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl ActionQueue {
    /// Create the queue and spawn its consumer task.
    pub fn new(config: &QueueConfig) -> Self {
        let mut priorities: Vec<(ActionType, u32)> =
            config.priorities.iter().map(|(k, w)| (*k, *w)).collect();
        priorities.sort_by(|a, b| b.1.cmp(&a.1));

        let inner = Arc::new(QueueInner {
            pending: Mutex::new(BTreeMap::new()),
            next_seq: AtomicU64::new(0),
            priorities,
            poll_interval: config.poll_interval(),
            stop: CancellationToken::new(),
            disposed: AtomicBool::new(false),
        });
        let consumer = tokio::spawn(consume(Arc::clone(&inner)));
        Self {
            inner,
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// Enqueue an operation and await its result.
    ///
    /// Blocks (awaits) only the submitting caller, until the consumer has
    /// executed the operation. Never resolves with another caller's result.
    /// After disposal this returns [`ClientError::QueueDisposed`]
    /// immediately instead of blocking forever.
    pub async fn submit(&self, kind: ActionType, op: ActionOp) -> ActionResult {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(ClientError::QueueDisposed.into());
        }
        let (done, result) = oneshot::channel();
        // Key assignment and insertion share one critical section so
        // pending keys always ascend in insertion order; a key must never
        // be drained past while its action is still outside the map.
        let seq = {
            let mut pending = self.inner.pending.lock();
            let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
            pending.insert(seq, QueuedAction { kind, op, done });
            seq
        };
        trace!(seq, ?kind, "action enqueued");

        // Disposal may have raced the insert; the drain in dispose() only
        // covers actions enqueued before it ran.
        if self.inner.disposed.load(Ordering::SeqCst) {
            self.inner.pending.lock().remove(&seq);
            return Err(ClientError::QueueDisposed.into());
        }

        match result.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::QueueDisposed.into()),
        }
    }

    /// Number of actions waiting to execute.
    pub fn pending(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Stop the consumer after any in-flight action finishes, drop the
    /// remaining pending actions (their submitters resolve with
    /// `QueueDisposed`), and mark the queue disposed. Idempotent.
    pub async fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
        self.inner.stop.cancel();
        let consumer = self.consumer.lock().take();
        if let Some(handle) = consumer {
            let _ = handle.await;
        }
        let drained = std::mem::take(&mut *self.inner.pending.lock());
        if !drained.is_empty() {
            debug!(dropped = drained.len(), "disposed queue dropped pending actions");
        }
    }
}

/// The consumer: one action runs fully, including the caller-supplied
/// operation, before the next is considered. Idle waits are a short fixed
/// sleep, interruptible by disposal.
#[instrument(skip(inner), name = "action_queue")]
async fn consume(inner: Arc<QueueInner>) {
    loop {
        if inner.stop.is_cancelled() {
            break;
        }
        match inner.take_next() {
            Some(action) => {
                let outcome = (action.op)().await;
                // A dropped receiver means the submitter gave up; nothing
                // to deliver to.
                let _ = action.done.send(outcome);
            }
            None => {
                tokio::select! {
                    () = inner.stop.cancelled() => break,
                    () = tokio::time::sleep(inner.poll_interval) => {}
                }
            }
        }
    }
    debug!("consumer stopped");
}
