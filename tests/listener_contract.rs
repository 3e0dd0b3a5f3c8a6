//! Listener contract enforcement through the session facade, and the
//! exception event a failing listener turns into.

mod common;

use backchat::{ChatSession, ClientConfig, ClientError, EventKind, Listener};
use common::server::FeedServer;
use common::{FixedContent, JsonDecoder, TokenProvider, wait_until};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn offline_session() -> ChatSession {
    ChatSession::new(
        ClientConfig::default(),
        Arc::new(TokenProvider::new("ws://127.0.0.1:1/")),
        Arc::new(JsonDecoder),
        Arc::new(FixedContent("body")),
        500,
    )
}

#[tokio::test]
async fn mismatched_shape_is_rejected_at_registration() {
    let session = offline_session();
    // MessagePosted expects a message callback; offer a user callback.
    let err = session
        .connect_listener(EventKind::MessagePosted, Listener::on_user(|_| Ok(())))
        .expect_err("shape mismatch");
    match err {
        ClientError::SignatureMismatch { kind, expected } => {
            assert_eq!(kind, EventKind::MessagePosted);
            assert_eq!(expected, "MessagePosted(Message)");
        }
        other => panic!("expected SignatureMismatch, got {other:?}"),
    }
    session.dispose().await;
}

#[tokio::test]
async fn reserved_kind_and_duplicate_registrations_are_rejected() {
    let session = offline_session();
    assert!(matches!(
        session.connect_listener(EventKind::GlobalNotification, Listener::on_raw(|_| Ok(()))),
        Err(ClientError::ArgumentInvalid(_))
    ));

    let listener = Listener::on_user(|_| Ok(()));
    session
        .connect_listener(EventKind::UserEntered, listener.clone())
        .expect("first registration");
    assert!(matches!(
        session.connect_listener(EventKind::UserEntered, listener),
        Err(ClientError::DuplicateRegistration(EventKind::UserEntered))
    ));
    session.dispose().await;
}

#[tokio::test]
async fn failing_listener_surfaces_as_one_internal_exception() {
    let server = FeedServer::spawn().await;
    let session = ChatSession::new(
        ClientConfig::default(),
        Arc::new(TokenProvider::new(server.url())),
        Arc::new(JsonDecoder),
        Arc::new(FixedContent("body")),
        500,
    );
    session
        .connect(&format!("{}?token=initial", server.url()), "http://origin.test")
        .await
        .expect("connect");
    server.wait_for_accepted(1).await;

    let exceptions = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&exceptions);
    session
        .connect_listener(
            EventKind::InternalException,
            Listener::on_error(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .expect("exception listener");

    session
        .connect_listener(
            EventKind::UserEntered,
            Listener::on_user(|_| Err(anyhow::anyhow!("listener exploded"))),
        )
        .expect("failing listener");
    let siblings = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&siblings);
    session
        .connect_listener(
            EventKind::UserEntered,
            Listener::on_user(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .expect("sibling listener");

    server.push(
        serde_json::json!({
            "event_type": EventKind::UserEntered.code(),
            "user_id": 9,
            "user_name": "newcomer",
        })
        .to_string(),
    );
    wait_until("exception to be delivered", || {
        exceptions.load(Ordering::SeqCst) == 1
    })
    .await;
    wait_until("sibling to run despite the failure", || {
        siblings.load(Ordering::SeqCst) == 1
    })
    .await;

    session.dispose().await;
}
