//! Payload shaping
//!
//! Turns entity snapshots into the minimal, stable JSON objects clients
//! receive. Shapers are pure and never fail on missing relations: an absent
//! author becomes `null`, an absent excerpt is derived from the body or
//! omitted. Credentials and contact fields on [`UserRecord`] are never
//! serialized.

use serde::Serialize;
use serde_json::Value;

use crate::entity::{
    Comment, ContentItem, ContentKind, EditorialMessage, ForumPost, ForumThread,
    NotificationRecord, Product, UserRecord,
};
use crate::errors::ContractError;
use crate::event::Payload;
use crate::types::{EntityId, UserId};

/// Default excerpt length in characters
pub const DEFAULT_EXCERPT_LENGTH: usize = 160;

// ----------------------------------------------------------------------------
// User Summary
// ----------------------------------------------------------------------------

/// Public projection of a user: `{id?, name, username?, avatar}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UserId>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub avatar: Option<String>,
}

impl From<&UserRecord> for UserSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: Some(user.id),
            name: user.name.clone(),
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

fn summarize(user: Option<&UserRecord>) -> Option<UserSummary> {
    user.map(UserSummary::from)
}

// ----------------------------------------------------------------------------
// Payload Structures
// ----------------------------------------------------------------------------

#[derive(Serialize)]
struct ContentPayload<'a> {
    id: EntityId,
    title: &'a str,
    slug: &'a str,
    excerpt: Option<String>,
    author: Option<UserSummary>,
    category: Option<&'a str>,
    thumbnail: Option<&'a str>,
    published_at: Option<String>,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    difficulty: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_seconds: Option<u32>,
}

#[derive(Serialize)]
struct ThreadPayload<'a> {
    id: EntityId,
    title: &'a str,
    slug: &'a str,
    category: Option<&'a str>,
    author: Option<UserSummary>,
    is_locked: bool,
    created_at: String,
}

#[derive(Serialize)]
struct ReplyPayload {
    id: EntityId,
    thread_id: Option<EntityId>,
    content: String,
    author: Option<UserSummary>,
    created_at: String,
}

#[derive(Serialize)]
struct CommentPayload<'a> {
    id: EntityId,
    commentable_type: &'a str,
    commentable_id: EntityId,
    parent_id: Option<EntityId>,
    content: &'a str,
    author: Option<UserSummary>,
    created_at: String,
}

#[derive(Serialize)]
struct StockPayload<'a> {
    id: EntityId,
    name: &'a str,
    slug: &'a str,
    stock: u32,
    is_available: bool,
    price_cents: u64,
    updated_at: String,
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    id: EntityId,
    subject: Option<&'a str>,
    body: &'a str,
    sender: Option<UserSummary>,
    group: Option<&'a str>,
    created_at: String,
}

#[derive(Serialize)]
struct ReadReceiptPayload {
    id: EntityId,
    message_ids: Vec<EntityId>,
    reader_id: Option<UserId>,
    read_at: Option<String>,
}

#[derive(Serialize)]
struct NotificationPayload<'a> {
    id: EntityId,
    #[serde(rename = "type")]
    notification_type: &'a str,
    message: &'a str,
    link: Option<&'a str>,
    data: Option<&'a Value>,
    timestamp: String,
}

// ----------------------------------------------------------------------------
// Payload Shaper
// ----------------------------------------------------------------------------

/// Builds wire payloads for each entity kind
#[derive(Debug, Clone)]
pub struct PayloadShaper {
    excerpt_length: usize,
}

impl Default for PayloadShaper {
    fn default() -> Self {
        Self::new(DEFAULT_EXCERPT_LENGTH)
    }
}

impl PayloadShaper {
    pub fn new(excerpt_length: usize) -> Self {
        Self { excerpt_length }
    }

    pub fn content(&self, item: &ContentItem) -> Result<Payload, ContractError> {
        let excerpt = item
            .excerpt
            .as_deref()
            .or(item.body.as_deref())
            .map(|text| clip(text, self.excerpt_length));

        to_payload(
            item.id,
            &ContentPayload {
                id: item.id,
                title: &item.title,
                slug: &item.slug,
                excerpt,
                author: summarize(item.author.as_ref()),
                category: item.category.as_deref(),
                thumbnail: item.thumbnail.as_deref(),
                published_at: item.published_at.map(|at| at.to_iso8601()),
                created_at: item.created_at.to_iso8601(),
                rating: item.rating.filter(|_| item.kind == ContentKind::Review),
                difficulty: item
                    .difficulty
                    .as_deref()
                    .filter(|_| item.kind == ContentKind::Guide),
                duration_seconds: item
                    .duration_seconds
                    .filter(|_| item.kind == ContentKind::Video),
            },
        )
    }

    pub fn thread(&self, thread: &ForumThread) -> Result<Payload, ContractError> {
        to_payload(
            thread.id,
            &ThreadPayload {
                id: thread.id,
                title: &thread.title,
                slug: &thread.slug,
                category: thread.category.as_deref(),
                author: summarize(thread.author.as_ref()),
                is_locked: thread.is_locked,
                created_at: thread.created_at.to_iso8601(),
            },
        )
    }

    pub fn reply(&self, post: &ForumPost) -> Result<Payload, ContractError> {
        to_payload(
            post.id,
            &ReplyPayload {
                id: post.id,
                thread_id: post.thread_id,
                content: post.body.clone(),
                author: summarize(post.author.as_ref()),
                created_at: post.created_at.to_iso8601(),
            },
        )
    }

    pub fn comment(&self, comment: &Comment) -> Result<Payload, ContractError> {
        to_payload(
            comment.id,
            &CommentPayload {
                id: comment.id,
                commentable_type: comment.parent_kind.plural(),
                commentable_id: comment.parent_id,
                parent_id: comment.reply_to,
                content: &comment.body,
                author: summarize(comment.author.as_ref()),
                created_at: comment.created_at.to_iso8601(),
            },
        )
    }

    pub fn stock(&self, product: &Product) -> Result<Payload, ContractError> {
        to_payload(
            product.id,
            &StockPayload {
                id: product.id,
                name: &product.name,
                slug: &product.slug,
                stock: product.stock,
                is_available: product.stock > 0,
                price_cents: product.price_cents,
                updated_at: product.updated_at.to_iso8601(),
            },
        )
    }

    pub fn message(&self, message: &EditorialMessage) -> Result<Payload, ContractError> {
        to_payload(
            message.id,
            &MessagePayload {
                id: message.id,
                subject: message.subject.as_deref(),
                body: &message.body,
                sender: summarize(message.sender.as_ref()),
                group: message.group.as_deref(),
                created_at: message.created_at.to_iso8601(),
            },
        )
    }

    /// Read receipt sent back to the sender when recipients open a message
    pub fn read_receipt(
        &self,
        message: &EditorialMessage,
        reader: Option<UserId>,
    ) -> Result<Payload, ContractError> {
        to_payload(
            message.id,
            &ReadReceiptPayload {
                id: message.id,
                message_ids: vec![message.id],
                reader_id: reader,
                read_at: message.read_at.map(|at| at.to_iso8601()),
            },
        )
    }

    pub fn notification(
        &self,
        notification: &NotificationRecord,
    ) -> Result<Payload, ContractError> {
        to_payload(
            notification.id,
            &NotificationPayload {
                id: notification.id,
                notification_type: &notification.notification_type,
                message: &notification.message,
                link: notification.link.as_deref(),
                data: notification.data.as_ref(),
                timestamp: notification.timestamp.to_iso8601(),
            },
        )
    }
}

fn to_payload<T: Serialize>(entity_id: EntityId, shaped: &T) -> Result<Payload, ContractError> {
    match serde_json::to_value(shaped) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ContractError::PayloadShaping {
            entity_id,
            reason: format!("expected a JSON object, got {other}"),
        }),
        Err(e) => Err(ContractError::PayloadShaping {
            entity_id,
            reason: e.to_string(),
        }),
    }
}

/// Clip `text` to at most `max_chars` characters, appending an ellipsis when cut
pub fn clip(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        None => trimmed.to_string(),
        Some((byte_index, _)) => {
            let mut clipped = trimmed[..byte_index].trim_end().to_string();
            clipped.push('…');
            clipped
        }
    }
}
