//! Transition detection
//!
//! The persistence layer calls a [`TransitionDetector`] after every
//! successful write. The detector decides, per entity kind, whether the write
//! is worth broadcasting and which event it fires. Detection is pure: it
//! reads two snapshots and never fails, so it can never abort the write.

use serde::{Deserialize, Serialize};

use crate::entity::{
    Actor, ContentKind, Entity, EntityKind, ModerationStatus, PublishStatus, Transition,
    WriteOperation,
};
use crate::event::EventName;
use crate::types::Timestamp;

// ----------------------------------------------------------------------------
// Detection
// ----------------------------------------------------------------------------

/// A transition judged publish-worthy, with the event it fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub event: EventName,
    pub entity: Entity,
    pub actor: Actor,
}

impl Detection {
    fn new(event: EventName, transition: &Transition) -> Self {
        Self {
            event,
            entity: transition.after.clone(),
            actor: transition.actor,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.entity.kind()
    }
}

/// Decides whether a write is publish-worthy.
///
/// Implementations must be side-effect free; returning `None` means the write
/// is not broadcast.
pub trait TransitionDetector: Send + Sync {
    fn detect(&self, transition: &Transition) -> Option<Detection>;
}

// ----------------------------------------------------------------------------
// Default Rules
// ----------------------------------------------------------------------------

/// Kind-specific publish-worthiness rules for every broadcastable entity
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDetector;

impl DefaultDetector {
    pub fn new() -> Self {
        Self
    }
}

impl TransitionDetector for DefaultDetector {
    fn detect(&self, transition: &Transition) -> Option<Detection> {
        if transition.operation == WriteOperation::Delete {
            return None;
        }

        let event = match &transition.after {
            Entity::Content(item) => {
                // Fires once, on the write that makes the item public
                let became_published = item.is_published()
                    && match transition.operation {
                        WriteOperation::Create => true,
                        _ => transition.is_dirty(content_status),
                    };
                became_published.then(|| published_event(item.kind))?
            }
            Entity::Thread(_) => {
                (transition.operation == WriteOperation::Create).then_some(EventName::ThreadCreated)?
            }
            Entity::Post(post) => (transition.operation == WriteOperation::Create
                && post.thread_id.is_some())
            .then_some(EventName::ReplyPosted)?,
            Entity::Comment(comment) => {
                let visible_now = comment.is_approved()
                    && match transition.operation {
                        WriteOperation::Create => true,
                        _ => transition.is_dirty(comment_status),
                    };
                visible_now.then_some(EventName::CommentPosted)?
            }
            Entity::Product(_) => (transition.operation == WriteOperation::Update
                && transition.is_dirty(product_stock))
            .then_some(EventName::ProductStockUpdated)?,
            Entity::Message(message) => match transition.operation {
                WriteOperation::Create => EventName::MessageSent,
                _ => (message.read_at.is_some() && transition.is_dirty(message_read_at))
                    .then_some(EventName::MessagesRead)?,
            },
            Entity::Notification(_) => (transition.operation == WriteOperation::Create)
                .then_some(EventName::NotificationReceived)?,
        };

        Some(Detection::new(event, transition))
    }
}

fn published_event(kind: ContentKind) -> EventName {
    match kind {
        ContentKind::Article => EventName::ArticlePublished,
        ContentKind::Review => EventName::ReviewPublished,
        ContentKind::Guide => EventName::GuidePublished,
        ContentKind::Video => EventName::VideoPublished,
    }
}

fn content_status(entity: &Entity) -> Option<PublishStatus> {
    match entity {
        Entity::Content(item) => Some(item.status),
        _ => None,
    }
}

fn comment_status(entity: &Entity) -> Option<ModerationStatus> {
    match entity {
        Entity::Comment(comment) => Some(comment.status),
        _ => None,
    }
}

fn product_stock(entity: &Entity) -> Option<u32> {
    match entity {
        Entity::Product(product) => Some(product.stock),
        _ => None,
    }
}

fn message_read_at(entity: &Entity) -> Option<Timestamp> {
    match entity {
        Entity::Message(message) => message.read_at,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{
        Comment, CommentableKind, ContentItem, EditorialMessage, ForumPost, Product,
    };
    use crate::types::{ConnectionId, EntityId, UserId};

    fn at(ms: i64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn article(status: PublishStatus, title: &str) -> Entity {
        let mut item = ContentItem::new(EntityId::new(1), ContentKind::Article, title, at(0));
        item.status = status;
        Entity::Content(item)
    }

    fn comment(status: ModerationStatus, body: &str) -> Entity {
        Entity::Comment(Comment {
            id: EntityId::new(30),
            parent_kind: CommentableKind::Article,
            parent_id: EntityId::new(1),
            reply_to: None,
            body: body.into(),
            status,
            author: None,
            created_at: at(0),
        })
    }

    fn product(stock: u32, description: &str) -> Entity {
        Entity::Product(Product {
            id: EntityId::new(9),
            name: "Pad".into(),
            slug: "pad".into(),
            description: Some(description.into()),
            stock,
            price_cents: 1_000,
            updated_at: at(0),
        })
    }

    fn detect(transition: Transition) -> Option<EventName> {
        DefaultDetector.detect(&transition).map(|d| d.event)
    }

    #[test]
    fn test_content_fires_once_on_publish() {
        let draft = article(PublishStatus::Draft, "Title");
        let published = article(PublishStatus::Published, "Title");
        let retitled = article(PublishStatus::Published, "New title");

        assert_eq!(detect(Transition::created(draft.clone())), None);
        assert_eq!(
            detect(Transition::updated(draft, published.clone())),
            Some(EventName::ArticlePublished)
        );
        assert_eq!(detect(Transition::updated(published.clone(), retitled)), None);
        assert_eq!(
            detect(Transition::created(published.clone())),
            Some(EventName::ArticlePublished)
        );
        assert_eq!(detect(Transition::deleted(published)), None);
    }

    #[test]
    fn test_unpublish_does_not_fire() {
        let published = article(PublishStatus::Published, "Title");
        let archived = article(PublishStatus::Archived, "Title");
        assert_eq!(detect(Transition::updated(published, archived)), None);
    }

    #[test]
    fn test_forum_post_requires_thread_scope() {
        let reply = Entity::Post(ForumPost {
            id: EntityId::new(2),
            thread_id: Some(EntityId::new(7)),
            body: "+1".into(),
            author: None,
            created_at: at(0),
        });
        let orphan = Entity::Post(ForumPost {
            id: EntityId::new(3),
            thread_id: None,
            body: "lost".into(),
            author: None,
            created_at: at(0),
        });
        assert_eq!(detect(Transition::created(reply.clone())), Some(EventName::ReplyPosted));
        assert_eq!(detect(Transition::created(orphan)), None);
        assert_eq!(detect(Transition::updated(reply.clone(), reply)), None);
    }

    #[test]
    fn test_comment_fires_on_approval_only() {
        let pending = comment(ModerationStatus::Pending, "hi");
        let approved = comment(ModerationStatus::Approved, "hi");
        let edited = comment(ModerationStatus::Approved, "hi, edited");

        assert_eq!(detect(Transition::created(pending.clone())), None);
        assert_eq!(
            detect(Transition::updated(pending, approved.clone())),
            Some(EventName::CommentPosted)
        );
        assert_eq!(detect(Transition::updated(approved.clone(), edited)), None);
        assert_eq!(
            detect(Transition::created(approved)),
            Some(EventName::CommentPosted)
        );
    }

    #[test]
    fn test_product_fires_on_stock_change_only() {
        assert_eq!(
            detect(Transition::updated(product(5, "a"), product(0, "a"))),
            Some(EventName::ProductStockUpdated)
        );
        assert_eq!(
            detect(Transition::updated(product(5, "a"), product(5, "b"))),
            None
        );
        assert_eq!(detect(Transition::created(product(5, "a"))), None);
    }

    #[test]
    fn test_messages_fire_on_create_and_first_read() {
        let unread = Entity::Message(EditorialMessage {
            id: EntityId::new(4),
            sender: None,
            recipients: vec![UserId::new(2)],
            group: None,
            subject: None,
            body: "welcome".into(),
            created_at: at(0),
            read_at: None,
        });
        let mut read = unread.clone();
        if let Entity::Message(message) = &mut read {
            message.read_at = Some(at(10));
        }

        assert_eq!(detect(Transition::created(unread.clone())), Some(EventName::MessageSent));
        assert_eq!(
            detect(Transition::updated(unread, read.clone())),
            Some(EventName::MessagesRead)
        );
        assert_eq!(detect(Transition::updated(read.clone(), read)), None);
    }

    #[test]
    fn test_detection_carries_explicit_actor() {
        let connection = ConnectionId::new();
        let actor = Actor::user(UserId::new(11)).on_connection(connection);
        let detection = DefaultDetector
            .detect(&Transition::created(article(PublishStatus::Published, "x")).by(actor))
            .unwrap();
        assert_eq!(detection.actor.connection, Some(connection));
        assert_eq!(detection.kind(), EntityKind::Article);
    }
}
