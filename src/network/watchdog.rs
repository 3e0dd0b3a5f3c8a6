//! Idle watchdog.
//!
//! The event feed goes silent when the resumable token behind the current
//! endpoint expires, without the socket ever erroring. The watchdog samples
//! the last-activity timestamp on a fixed interval and, once the idle
//! threshold is crossed while the stream is open, forces exactly one
//! disconnect+connect cycle. The `recovering` flag keeps it from firing
//! again on every later poll tick of the same episode; it re-arms only when
//! a text frame arrives.

use crate::network::transport::TransportInner;
use crate::network::ConnectionState;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

pub(crate) fn spawn(inner: Arc<TransportInner>) -> JoinHandle<()> {
    tokio::spawn(run(inner))
}

#[instrument(skip_all, name = "idle_watchdog")]
async fn run(inner: Arc<TransportInner>) {
    let mut ticker = tokio::time::interval(inner.config.watchdog_poll());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = inner.lifetime.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if inner.state() != ConnectionState::Open {
            continue;
        }
        let idle = inner.last_activity.lock().elapsed();
        if idle < inner.config.idle_threshold() {
            continue;
        }
        if inner.recovering.swap(true, Ordering::SeqCst) {
            // Recovery already ran for this idle episode; it re-arms when
            // activity resumes.
            continue;
        }
        warn!(
            idle_secs = idle.as_secs(),
            "stream idle past threshold, forcing reconnect"
        );
        inner.recycle.notify_one();
    }
    debug!("watchdog stopped");
}
