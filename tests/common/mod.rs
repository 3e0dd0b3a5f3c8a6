//! Shared integration-test harness.
#![allow(dead_code)]

pub mod server;

use async_trait::async_trait;
use backchat::{ContentExtractor, EventKind, FieldMap, FrameDecoder, MessageId, SessionProvider};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Decodes test frames: one JSON object per frame, or an array of them,
/// each carrying the event kind's wire code in `event_type`.
pub struct JsonDecoder;

impl FrameDecoder for JsonDecoder {
    fn decode(&self, raw: &str) -> Vec<(EventKind, FieldMap)> {
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(_) => return Vec::new(),
        };
        let items = match value {
            serde_json::Value::Array(items) => items,
            object @ serde_json::Value::Object(_) => vec![object],
            _ => return Vec::new(),
        };
        items
            .into_iter()
            .filter_map(|item| {
                let serde_json::Value::Object(fields) = item else {
                    return None;
                };
                let code = u16::try_from(fields.get("event_type")?.as_u64()?).ok()?;
                Some((EventKind::from_code(code)?, fields))
            })
            .collect()
    }
}

/// Session provider handing out a fresh tokenized endpoint per call, the
/// way the real service rotates resumable stream URLs.
pub struct TokenProvider {
    base: String,
    issued: AtomicUsize,
}

impl TokenProvider {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            issued: AtomicUsize::new(0),
        }
    }

    /// Number of endpoints handed out so far.
    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for TokenProvider {
    async fn stream_endpoint(&self) -> anyhow::Result<String> {
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}?token={n}", self.base))
    }
}

/// Content extractor returning a fixed body for any message id.
pub struct FixedContent(pub &'static str);

#[async_trait]
impl ContentExtractor for FixedContent {
    async fn message_content(&self, _id: MessageId) -> anyhow::Result<String> {
        Ok(self.0.to_string())
    }
}

/// Poll `cond` until it holds, failing the test after five seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
