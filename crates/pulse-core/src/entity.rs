//! Broadcastable entity snapshots and write transitions
//!
//! The persistence layer owns every entity; the fabric only ever sees a
//! read-only snapshot of the row before and after a write, wrapped in a
//! [`Transition`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ConnectionId, EntityId, Timestamp, UserId};

// ----------------------------------------------------------------------------
// Entity Kinds
// ----------------------------------------------------------------------------

/// Every kind of entity the fabric knows how to broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Article,
    Review,
    Guide,
    Video,
    ForumThread,
    ForumPost,
    Comment,
    Product,
    EditorialMessage,
    Notification,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::Article,
        EntityKind::Review,
        EntityKind::Guide,
        EntityKind::Video,
        EntityKind::ForumThread,
        EntityKind::ForumPost,
        EntityKind::Comment,
        EntityKind::Product,
        EntityKind::EditorialMessage,
        EntityKind::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Article => "article",
            EntityKind::Review => "review",
            EntityKind::Guide => "guide",
            EntityKind::Video => "video",
            EntityKind::ForumThread => "forum_thread",
            EntityKind::ForumPost => "forum_post",
            EntityKind::Comment => "comment",
            EntityKind::Product => "product",
            EntityKind::EditorialMessage => "editorial_message",
            EntityKind::Notification => "notification",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four editorial content types that share the publish workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Article,
    Review,
    Guide,
    Video,
}

impl ContentKind {
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            ContentKind::Article => EntityKind::Article,
            ContentKind::Review => EntityKind::Review,
            ContentKind::Guide => EntityKind::Guide,
            ContentKind::Video => EntityKind::Video,
        }
    }
}

/// Entity kinds that can own a comment section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentableKind {
    Article,
    Review,
    Guide,
    Video,
    Product,
}

impl CommentableKind {
    /// Plural segment used in scoped comment channel names
    pub fn plural(&self) -> &'static str {
        match self {
            CommentableKind::Article => "articles",
            CommentableKind::Review => "reviews",
            CommentableKind::Guide => "guides",
            CommentableKind::Video => "videos",
            CommentableKind::Product => "products",
        }
    }

    pub fn from_plural(plural: &str) -> Option<Self> {
        match plural {
            "articles" => Some(CommentableKind::Article),
            "reviews" => Some(CommentableKind::Review),
            "guides" => Some(CommentableKind::Guide),
            "videos" => Some(CommentableKind::Video),
            "products" => Some(CommentableKind::Product),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Status Values
// ----------------------------------------------------------------------------

/// Editorial workflow status of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    Draft,
    Scheduled,
    Published,
    Archived,
}

/// Moderation status of user-generated comments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
    Spam,
}

// ----------------------------------------------------------------------------
// Related Records
// ----------------------------------------------------------------------------

/// A user row as loaded by the persistence layer.
///
/// Carries credentials and contact details that must never leave the server;
/// payload shapers reduce it to an [`crate::payload::UserSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub email: Option<String>,
    pub remember_token: Option<String>,
}

impl UserRecord {
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            username: None,
            avatar: None,
            email: None,
            remember_token: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

// ----------------------------------------------------------------------------
// Entity Snapshots
// ----------------------------------------------------------------------------

/// Article, review, guide or video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: EntityId,
    pub kind: ContentKind,
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub body: Option<String>,
    pub status: PublishStatus,
    pub author: Option<UserRecord>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    /// Review score, reviews only
    pub rating: Option<f64>,
    /// Guide difficulty label, guides only
    pub difficulty: Option<String>,
    /// Video running time, videos only
    pub duration_seconds: Option<u32>,
    pub published_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ContentItem {
    pub fn new(id: EntityId, kind: ContentKind, title: impl Into<String>, at: Timestamp) -> Self {
        let title = title.into();
        let slug = slugify(&title);
        Self {
            id,
            kind,
            title,
            slug,
            excerpt: None,
            body: None,
            status: PublishStatus::Draft,
            author: None,
            category: None,
            thumbnail: None,
            rating: None,
            difficulty: None,
            duration_seconds: None,
            published_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumThread {
    pub id: EntityId,
    pub title: String,
    pub slug: String,
    pub category: Option<String>,
    pub author: Option<UserRecord>,
    pub is_locked: bool,
    pub created_at: Timestamp,
}

/// A post inside the forum; replies are posts scoped to a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: EntityId,
    pub thread_id: Option<EntityId>,
    pub body: String,
    pub author: Option<UserRecord>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub parent_kind: CommentableKind,
    pub parent_id: EntityId,
    pub reply_to: Option<EntityId>,
    pub body: String,
    pub status: ModerationStatus,
    pub author: Option<UserRecord>,
    pub created_at: Timestamp,
}

impl Comment {
    pub fn is_approved(&self) -> bool {
        self.status == ModerationStatus::Approved
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub stock: u32,
    pub price_cents: u64,
    pub updated_at: Timestamp,
}

/// Editorial or direct message between staff and users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorialMessage {
    pub id: EntityId,
    pub sender: Option<UserRecord>,
    /// Explicit recipients; when empty the message targets `group`
    pub recipients: Vec<UserId>,
    pub group: Option<String>,
    pub subject: Option<String>,
    pub body: String,
    pub created_at: Timestamp,
    pub read_at: Option<Timestamp>,
}

/// A notification addressed to exactly one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: EntityId,
    pub recipient_id: UserId,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub link: Option<String>,
    pub data: Option<Value>,
    pub timestamp: Timestamp,
}

/// Snapshot of any broadcastable entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum Entity {
    Content(ContentItem),
    Thread(ForumThread),
    Post(ForumPost),
    Comment(Comment),
    Product(Product),
    Message(EditorialMessage),
    Notification(NotificationRecord),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Content(item) => item.kind.entity_kind(),
            Entity::Thread(_) => EntityKind::ForumThread,
            Entity::Post(_) => EntityKind::ForumPost,
            Entity::Comment(_) => EntityKind::Comment,
            Entity::Product(_) => EntityKind::Product,
            Entity::Message(_) => EntityKind::EditorialMessage,
            Entity::Notification(_) => EntityKind::Notification,
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            Entity::Content(item) => item.id,
            Entity::Thread(thread) => thread.id,
            Entity::Post(post) => post.id,
            Entity::Comment(comment) => comment.id,
            Entity::Product(product) => product.id,
            Entity::Message(message) => message.id,
            Entity::Notification(notification) => notification.id,
        }
    }

    /// The user credited with authoring the entity, if any
    pub fn author_id(&self) -> Option<UserId> {
        match self {
            Entity::Content(item) => item.author.as_ref().map(|a| a.id),
            Entity::Thread(thread) => thread.author.as_ref().map(|a| a.id),
            Entity::Post(post) => post.author.as_ref().map(|a| a.id),
            Entity::Comment(comment) => comment.author.as_ref().map(|a| a.id),
            Entity::Message(message) => message.sender.as_ref().map(|s| s.id),
            Entity::Product(_) | Entity::Notification(_) => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Transitions
// ----------------------------------------------------------------------------

/// The kind of write that produced a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOperation {
    Create,
    Update,
    Delete,
}

/// Who performed a write, threaded explicitly through every publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Option<UserId>,
    /// Socket connection that issued the write; excluded from the echo
    pub connection: Option<ConnectionId>,
}

impl Actor {
    /// A write with no interactive originator (jobs, console commands)
    pub fn system() -> Self {
        Self::default()
    }

    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            connection: None,
        }
    }

    pub fn on_connection(mut self, connection: ConnectionId) -> Self {
        self.connection = Some(connection);
        self
    }
}

/// One write operation as seen by the fabric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub operation: WriteOperation,
    /// Row state before the write; `None` for creates
    pub before: Option<Entity>,
    /// Row state after the write; for deletes, the last known state
    pub after: Entity,
    pub actor: Actor,
}

impl Transition {
    pub fn created(entity: Entity) -> Self {
        Self {
            operation: WriteOperation::Create,
            before: None,
            after: entity,
            actor: Actor::system(),
        }
    }

    pub fn updated(before: Entity, after: Entity) -> Self {
        Self {
            operation: WriteOperation::Update,
            before: Some(before),
            after,
            actor: Actor::system(),
        }
    }

    pub fn deleted(entity: Entity) -> Self {
        Self {
            operation: WriteOperation::Delete,
            before: None,
            after: entity,
            actor: Actor::system(),
        }
    }

    pub fn by(mut self, actor: Actor) -> Self {
        self.actor = actor;
        self
    }

    pub fn kind(&self) -> EntityKind {
        self.after.kind()
    }

    /// Whether the field selected by `field` differs between the two snapshots.
    ///
    /// Creates count every present field as dirty. A missing `before` on an
    /// update is treated the same way.
    pub fn is_dirty<T, F>(&self, field: F) -> bool
    where
        T: PartialEq,
        F: Fn(&Entity) -> Option<T>,
    {
        match (&self.before, field(&self.after)) {
            (_, None) => self
                .before
                .as_ref()
                .is_some_and(|before| field(before).is_some()),
            (None, Some(_)) => true,
            (Some(before), Some(after)) => field(before).as_ref() != Some(&after),
        }
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Lowercase, hyphen-separated slug built from alphanumerics
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}
