//! Frame handlers.
//!
//! The frame decoder (an external collaborator) turns a raw frame into
//! `(EventKind, field map)` tuples; the handlers here convert a field map
//! into the typed argument tuple for that kind, building domain objects,
//! computing whether the session's own identity caused the event, and
//! falling back to the content extractor when a frame omits the message
//! body. Kinds without a handler (reserved or client-side pseudo kinds)
//! are silently dropped.

use crate::event::{EventArgs, EventKind};
use crate::session::ContentExtractor;
use crate::state::{AccessLevel, ChatMessage, ChatUser, Room, UserId};
use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Decoded fields of one event, as produced by the frame decoder.
pub type FieldMap = serde_json::Map<String, Value>;

/// Context shared by all frame handlers.
pub(crate) struct HandlerContext {
    /// The session's own identity, for self-caused detection.
    pub own_user_id: UserId,
    pub extractor: Arc<dyn ContentExtractor>,
}

/// A converted event, ready for dispatch.
#[derive(Debug)]
pub(crate) struct Dispatch {
    pub self_caused: bool,
    pub args: EventArgs,
}

/// Converts one kind's field map into typed dispatch arguments.
#[async_trait]
trait FrameHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch>;
}

/// Registry of frame handlers, one per decodable event kind.
pub(crate) struct HandlerRegistry {
    handlers: HashMap<EventKind, Box<dyn FrameHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        let mut handlers: HashMap<EventKind, Box<dyn FrameHandler>> = HashMap::new();

        // Message lifecycle
        handlers.insert(EventKind::MessagePosted, Box::new(MessageHandler));
        handlers.insert(EventKind::MessageEdited, Box::new(MessageHandler));
        handlers.insert(EventKind::MessageMovedIn, Box::new(MessageHandler));
        handlers.insert(EventKind::MessageMovedOut, Box::new(MessageHandler));
        handlers.insert(EventKind::MessageDeleted, Box::new(DeletionHandler));
        handlers.insert(EventKind::MessageStarToggled, Box::new(StarHandler));

        // Mentions and replies carry the acting user alongside the message
        handlers.insert(EventKind::UserMentioned, Box::new(MessageUserHandler));
        handlers.insert(EventKind::MessageReply, Box::new(MessageUserHandler));

        // Presence and room state
        handlers.insert(EventKind::UserEntered, Box::new(PresenceHandler));
        handlers.insert(EventKind::UserLeft, Box::new(PresenceHandler));
        handlers.insert(EventKind::AccessLevelChanged, Box::new(AccessHandler));
        handlers.insert(EventKind::RoomMetaChanged, Box::new(RoomMetaHandler));

        Self { handlers }
    }

    /// Convert `fields` for `kind`, or `None` when the kind has no handler.
    pub async fn convert(
        &self,
        ctx: &HandlerContext,
        kind: EventKind,
        fields: &FieldMap,
    ) -> anyhow::Result<Option<Dispatch>> {
        match self.handlers.get(&kind) {
            Some(handler) => handler.handle(ctx, fields).await.map(Some),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Field access helpers
// ============================================================================

fn u64_field(fields: &FieldMap, name: &str) -> anyhow::Result<u64> {
    fields
        .get(name)
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("missing or non-numeric field `{name}`"))
}

fn opt_u64(fields: &FieldMap, name: &str) -> Option<u64> {
    fields.get(name).and_then(Value::as_u64)
}

fn str_field<'a>(fields: &'a FieldMap, name: &str) -> anyhow::Result<&'a str> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing or non-string field `{name}`"))
}

fn opt_str<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a str> {
    fields.get(name).and_then(Value::as_str)
}

/// Event timestamp in epoch seconds; the feed omits it on some kinds.
fn timestamp_field(fields: &FieldMap) -> DateTime<Utc> {
    opt_u64(fields, "time_stamp")
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
        .unwrap_or_else(Utc::now)
}

/// Build the acting user from the standard `user_id`/`user_name` fields.
fn acting_user(fields: &FieldMap) -> anyhow::Result<Arc<ChatUser>> {
    let id = u64_field(fields, "user_id")?;
    let name = opt_str(fields, "user_name").unwrap_or_default();
    Ok(Arc::new(ChatUser::new(id, name, AccessLevel::default())))
}

/// Build the message an event is about. The author defaults to the acting
/// user unless the frame names one separately; the body is fetched
/// out-of-band when the frame omits it.
async fn build_message(
    ctx: &HandlerContext,
    fields: &FieldMap,
) -> anyhow::Result<(Arc<ChatMessage>, UserId)> {
    let id = u64_field(fields, "message_id")?;
    let room_id = u64_field(fields, "room_id")?;
    let actor_id = u64_field(fields, "user_id")?;
    let author_id = opt_u64(fields, "author_id").unwrap_or(actor_id);
    let content = match opt_str(fields, "content") {
        Some(content) => content.to_string(),
        None => ctx
            .extractor
            .message_content(id)
            .await
            .with_context(|| format!("fetching content of message {id}"))?,
    };
    let message = Arc::new(ChatMessage::new(
        id,
        room_id,
        author_id,
        content,
        timestamp_field(fields),
    ));
    Ok((message, actor_id))
}

// ============================================================================
// Handlers
// ============================================================================

/// MessagePosted / MessageEdited / MessageMovedIn / MessageMovedOut.
struct MessageHandler;

#[async_trait]
impl FrameHandler for MessageHandler {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch> {
        let (message, actor_id) = build_message(ctx, fields).await?;
        Ok(Dispatch {
            self_caused: actor_id == ctx.own_user_id,
            args: EventArgs::Message(message),
        })
    }
}

/// UserMentioned / MessageReply.
struct MessageUserHandler;

#[async_trait]
impl FrameHandler for MessageUserHandler {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch> {
        let user = acting_user(fields)?;
        let (message, actor_id) = build_message(ctx, fields).await?;
        Ok(Dispatch {
            self_caused: actor_id == ctx.own_user_id,
            args: EventArgs::MessageUser(message, user),
        })
    }
}

/// MessageDeleted: the deleted body is gone, only the id and the acting
/// user survive.
struct DeletionHandler;

#[async_trait]
impl FrameHandler for DeletionHandler {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch> {
        let user = acting_user(fields)?;
        let message_id = u64_field(fields, "message_id")?;
        Ok(Dispatch {
            self_caused: user.id() == ctx.own_user_id,
            args: EventArgs::UserMessageId(user, message_id),
        })
    }
}

/// MessageStarToggled: message, toggling user, and the new totals.
struct StarHandler;

#[async_trait]
impl FrameHandler for StarHandler {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch> {
        let user = acting_user(fields)?;
        let (message, actor_id) = build_message(ctx, fields).await?;
        let stars = opt_u64(fields, "star_count").unwrap_or(0) as u32;
        let pins = opt_u64(fields, "pin_count").unwrap_or(0) as u32;
        message.apply_star(stars, pins);
        Ok(Dispatch {
            self_caused: actor_id == ctx.own_user_id,
            args: EventArgs::Star(message, user, stars, pins),
        })
    }
}

/// UserEntered / UserLeft.
struct PresenceHandler;

#[async_trait]
impl FrameHandler for PresenceHandler {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch> {
        let user = acting_user(fields)?;
        Ok(Dispatch {
            self_caused: user.id() == ctx.own_user_id,
            args: EventArgs::User(user),
        })
    }
}

/// AccessLevelChanged: a moderator (`user_id`) changed the access of
/// `target_user_id`.
struct AccessHandler;

#[async_trait]
impl FrameHandler for AccessHandler {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch> {
        let actor_id = u64_field(fields, "user_id")?;
        let target_id = u64_field(fields, "target_user_id")?;
        let target_name = opt_str(fields, "target_user_name").unwrap_or_default();
        let level = str_field(fields, "access_level")?;
        let level = AccessLevel::parse(level)
            .ok_or_else(|| anyhow!("unknown access level `{level}`"))?;
        let target = Arc::new(ChatUser::new(target_id, target_name, level));
        Ok(Dispatch {
            self_caused: actor_id == ctx.own_user_id,
            args: EventArgs::UserAccess(target, level),
        })
    }
}

/// RoomMetaChanged.
struct RoomMetaHandler;

#[async_trait]
impl FrameHandler for RoomMetaHandler {
    async fn handle(&self, ctx: &HandlerContext, fields: &FieldMap) -> anyhow::Result<Dispatch> {
        let room_id = u64_field(fields, "room_id")?;
        let name = str_field(fields, "room_name")?;
        let description = opt_str(fields, "description").unwrap_or_default();
        let room = Arc::new(Room::new(room_id, name, description));
        Ok(Dispatch {
            self_caused: opt_u64(fields, "user_id") == Some(ctx.own_user_id),
            args: EventArgs::Room(room),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoFetch;

    #[async_trait]
    impl ContentExtractor for NoFetch {
        async fn message_content(&self, _id: crate::state::MessageId) -> anyhow::Result<String> {
            Err(anyhow!("extractor not expected"))
        }
    }

    struct CannedFetch(&'static str);

    #[async_trait]
    impl ContentExtractor for CannedFetch {
        async fn message_content(&self, _id: crate::state::MessageId) -> anyhow::Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn ctx(extractor: impl ContentExtractor + 'static) -> HandlerContext {
        HandlerContext {
            own_user_id: 500,
            extractor: Arc::new(extractor),
        }
    }

    fn fields(json: serde_json::Value) -> FieldMap {
        match json {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn posted_message_builds_from_fields() {
        let registry = HandlerRegistry::new();
        let fields = fields(serde_json::json!({
            "message_id": 77, "room_id": 3, "user_id": 500,
            "content": "hi there", "time_stamp": 1_700_000_000u64,
        }));
        let dispatch = registry
            .convert(&ctx(NoFetch), EventKind::MessagePosted, &fields)
            .await
            .expect("convert")
            .expect("handler exists");
        assert!(dispatch.self_caused);
        match dispatch.args {
            EventArgs::Message(message) => {
                assert_eq!(message.id(), 77);
                assert_eq!(message.content(), "hi there");
            }
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_body_falls_back_to_the_extractor() {
        let registry = HandlerRegistry::new();
        let fields = fields(serde_json::json!({
            "message_id": 78, "room_id": 3, "user_id": 9,
        }));
        let dispatch = registry
            .convert(&ctx(CannedFetch("fetched body")), EventKind::MessageEdited, &fields)
            .await
            .expect("convert")
            .expect("handler exists");
        assert!(!dispatch.self_caused);
        match dispatch.args {
            EventArgs::Message(message) => assert_eq!(message.content(), "fetched body"),
            other => panic!("unexpected args {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_required_field_is_an_error() {
        let registry = HandlerRegistry::new();
        let fields = fields(serde_json::json!({ "room_id": 3, "user_id": 9 }));
        let err = registry
            .convert(&ctx(NoFetch), EventKind::MessageDeleted, &fields)
            .await
            .expect_err("message_id is required");
        assert!(err.to_string().contains("message_id"));
    }

    #[tokio::test]
    async fn reserved_kinds_have_no_handler() {
        let registry = HandlerRegistry::new();
        let empty = FieldMap::new();
        let converted = registry
            .convert(&ctx(NoFetch), EventKind::FeedTicker, &empty)
            .await
            .expect("no handler is not an error");
        assert!(converted.is_none());
    }
}
