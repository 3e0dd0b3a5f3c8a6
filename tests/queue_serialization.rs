//! Action queue ordering: strict serialization, FIFO by default, priority
//! weights when configured, and clean disposal semantics.

use backchat::{ActionQueue, ActionType, ClientError, QueueConfig, action};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn config(priorities: &[(ActionType, u32)]) -> QueueConfig {
    QueueConfig {
        poll_interval_ms: 5,
        priorities: priorities.iter().copied().collect(),
    }
}

fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> backchat::ActionOp) {
    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&order);
    let record = move |label: &'static str| {
        let sink = Arc::clone(&sink);
        action(move || async move {
            sink.lock().push(label);
            Ok(serde_json::Value::Null)
        })
    };
    (order, record)
}

#[tokio::test]
async fn interleaved_submits_execute_in_submission_order() {
    let queue = ActionQueue::new(&config(&[]));
    let (order, record) = recorder();

    // join! polls in listed order, so enqueue order is deterministic even
    // though all five await concurrently.
    let (a, b, c, d, e) = tokio::join!(
        queue.submit(ActionType::PostMessage, record("a")),
        queue.submit(ActionType::EditMessage, record("b")),
        queue.submit(ActionType::ToggleStar, record("c")),
        queue.submit(ActionType::PostMessage, record("d")),
        queue.submit(ActionType::DeleteMessage, record("e")),
    );
    for result in [a, b, c, d, e] {
        result.expect("submit");
    }
    assert_eq!(order.lock().as_slice(), ["a", "b", "c", "d", "e"]);
    queue.dispose().await;
}

#[tokio::test]
async fn priority_weights_override_arrival_order() {
    let queue = ActionQueue::new(&config(&[
        (ActionType::KickMute, 10),
        (ActionType::PostMessage, 1),
    ]));
    let (order, record) = recorder();

    // The gate occupies the consumer long enough for both later actions to
    // be pending at once; the kick then outranks the earlier post.
    let sink = Arc::clone(&order);
    let gate = action(move || async move {
        sink.lock().push("gate");
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(serde_json::Value::Null)
    });
    let (g, low, high) = tokio::join!(
        queue.submit(ActionType::PostMessage, gate),
        queue.submit(ActionType::PostMessage, record("post")),
        queue.submit(ActionType::KickMute, record("kick")),
    );
    g.expect("gate");
    low.expect("post");
    high.expect("kick");
    assert_eq!(order.lock().as_slice(), ["gate", "kick", "post"]);
    queue.dispose().await;
}

#[tokio::test]
async fn priority_table_matching_nothing_falls_back_to_fifo() {
    let queue = ActionQueue::new(&config(&[(ActionType::KickMute, 10)]));
    let (order, record) = recorder();

    let sink = Arc::clone(&order);
    let gate = action(move || async move {
        sink.lock().push("gate");
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(serde_json::Value::Null)
    });
    let (g, first, second) = tokio::join!(
        queue.submit(ActionType::EditMessage, gate),
        queue.submit(ActionType::PostMessage, record("first")),
        queue.submit(ActionType::EditMessage, record("second")),
    );
    g.expect("gate");
    first.expect("first");
    second.expect("second");
    assert_eq!(order.lock().as_slice(), ["gate", "first", "second"]);
    queue.dispose().await;
}

#[tokio::test]
async fn dispose_drops_pending_actions_without_blocking_their_submitters() {
    let queue = Arc::new(ActionQueue::new(&config(&[])));

    let gate = action(|| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(serde_json::Value::Null)
    });
    let gated = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.submit(ActionType::PostMessage, gate).await })
    };
    // Make sure the gate is in flight before the second submission lands.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let pending = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            queue
                .submit(ActionType::EditMessage, action(|| async { Ok(0.into()) }))
                .await
        })
    };
    // Let both submissions land, then dispose while the gate is running.
    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.dispose().await;

    // The in-flight action finished; the pending one resolved with the
    // disposal error instead of hanging.
    gated.await.expect("join").expect("in-flight action completes");
    let err = pending
        .await
        .expect("join")
        .expect_err("pending action is dropped");
    assert_eq!(
        err.downcast_ref::<ClientError>().map(ClientError::error_code),
        Some("queue_disposed")
    );
}
