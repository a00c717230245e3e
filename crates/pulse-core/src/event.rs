//! Event names and the broadcast envelope
//!
//! Event names follow the `{noun}.{past_participle}` convention and, like
//! channel names, must match the client byte-for-byte.

use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::Channel;
use crate::types::ConnectionId;

// ----------------------------------------------------------------------------
// Event Names
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "article.published")]
    ArticlePublished,
    #[serde(rename = "review.published")]
    ReviewPublished,
    #[serde(rename = "guide.published")]
    GuidePublished,
    #[serde(rename = "video.published")]
    VideoPublished,
    #[serde(rename = "thread.created")]
    ThreadCreated,
    #[serde(rename = "reply.posted")]
    ReplyPosted,
    #[serde(rename = "comment.posted")]
    CommentPosted,
    #[serde(rename = "product.stock.updated")]
    ProductStockUpdated,
    #[serde(rename = "notification.received")]
    NotificationReceived,
    #[serde(rename = "message.sent")]
    MessageSent,
    #[serde(rename = "messages.read")]
    MessagesRead,
}

impl EventName {
    pub const ALL: [EventName; 11] = [
        EventName::ArticlePublished,
        EventName::ReviewPublished,
        EventName::GuidePublished,
        EventName::VideoPublished,
        EventName::ThreadCreated,
        EventName::ReplyPosted,
        EventName::CommentPosted,
        EventName::ProductStockUpdated,
        EventName::NotificationReceived,
        EventName::MessageSent,
        EventName::MessagesRead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::ArticlePublished => "article.published",
            EventName::ReviewPublished => "review.published",
            EventName::GuidePublished => "guide.published",
            EventName::VideoPublished => "video.published",
            EventName::ThreadCreated => "thread.created",
            EventName::ReplyPosted => "reply.posted",
            EventName::CommentPosted => "comment.posted",
            EventName::ProductStockUpdated => "product.stock.updated",
            EventName::NotificationReceived => "notification.received",
            EventName::MessageSent => "message.sent",
            EventName::MessagesRead => "messages.read",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.as_str() == name)
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Broadcast Event
// ----------------------------------------------------------------------------

/// Flat JSON object carried by every event
pub type Payload = Map<String, Value>;

/// One publication: ephemeral, fire-and-forget, at-most-once
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastEvent {
    pub channel: Channel,
    pub event: EventName,
    pub payload: Payload,
    /// Connection that must not receive this event (the originator's own socket)
    pub exclude: Option<ConnectionId>,
}

impl BroadcastEvent {
    pub fn new(channel: Channel, event: EventName, payload: Payload) -> Self {
        Self {
            channel,
            event,
            payload,
            exclude: None,
        }
    }

    /// Deliver to everyone on the channel except `connection`
    pub fn to_others(mut self, connection: Option<ConnectionId>) -> Self {
        self.exclude = connection;
        self
    }

    /// Id of the entity the payload describes, when it has one
    pub fn entity_id(&self) -> Option<u64> {
        self.payload.get("id").and_then(Value::as_u64)
    }
}
