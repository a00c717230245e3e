//! Channel/event contract registry
//!
//! Maps every event the fabric can emit to its entity kind, visibility class
//! and channel naming pattern, and turns a [`Detection`] into the concrete
//! [`BroadcastEvent`]s to publish. Resolution and shaping are pure.

use hashbrown::HashMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::channel::{Channel, Visibility};
use crate::config::ContractConfig;
use crate::detector::Detection;
use crate::entity::{EditorialMessage, Entity, EntityKind};
use crate::errors::ContractError;
use crate::event::{BroadcastEvent, EventName, Payload};
use crate::payload::PayloadShaper;

/// Most entities resolve to a single channel; multi-recipient messages spill to the heap
pub type ChannelList = SmallVec<[Channel; 2]>;

// ----------------------------------------------------------------------------
// Contract Entries
// ----------------------------------------------------------------------------

/// One row of the contract table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContractEntry {
    pub event: EventName,
    pub kind: EntityKind,
    pub visibility: Visibility,
    /// Human-readable channel pattern, e.g. `forum.thread.{thread_id}`
    pub channel_pattern: &'static str,
}

const ENTRIES: [ContractEntry; 11] = [
    ContractEntry {
        event: EventName::ArticlePublished,
        kind: EntityKind::Article,
        visibility: Visibility::Public,
        channel_pattern: "news",
    },
    ContractEntry {
        event: EventName::ReviewPublished,
        kind: EntityKind::Review,
        visibility: Visibility::Public,
        channel_pattern: "reviews",
    },
    ContractEntry {
        event: EventName::GuidePublished,
        kind: EntityKind::Guide,
        visibility: Visibility::Public,
        channel_pattern: "guides",
    },
    ContractEntry {
        event: EventName::VideoPublished,
        kind: EntityKind::Video,
        visibility: Visibility::Public,
        channel_pattern: "videos",
    },
    ContractEntry {
        event: EventName::ThreadCreated,
        kind: EntityKind::ForumThread,
        visibility: Visibility::Public,
        channel_pattern: "forum",
    },
    ContractEntry {
        event: EventName::ReplyPosted,
        kind: EntityKind::ForumPost,
        visibility: Visibility::Scoped,
        channel_pattern: "forum.thread.{thread_id}",
    },
    ContractEntry {
        event: EventName::CommentPosted,
        kind: EntityKind::Comment,
        visibility: Visibility::Scoped,
        channel_pattern: "comments.{parent_kind_plural}.{parent_id}",
    },
    ContractEntry {
        event: EventName::ProductStockUpdated,
        kind: EntityKind::Product,
        visibility: Visibility::Public,
        channel_pattern: "shop",
    },
    ContractEntry {
        event: EventName::NotificationReceived,
        kind: EntityKind::Notification,
        visibility: Visibility::Private,
        channel_pattern: "user.{user_id}",
    },
    ContractEntry {
        event: EventName::MessageSent,
        kind: EntityKind::EditorialMessage,
        visibility: Visibility::Private,
        channel_pattern: "editorial.user.{user_id} | editorial.channel.{name}",
    },
    ContractEntry {
        event: EventName::MessagesRead,
        kind: EntityKind::EditorialMessage,
        visibility: Visibility::Private,
        channel_pattern: "editorial.user.{sender_id}",
    },
];

// ----------------------------------------------------------------------------
// Channel Contract
// ----------------------------------------------------------------------------

/// Registry of channel resolvers and payload shapers
#[derive(Debug, Clone)]
pub struct ChannelContract {
    entries: HashMap<EventName, ContractEntry>,
    shaper: PayloadShaper,
}

impl Default for ChannelContract {
    fn default() -> Self {
        Self::new(&ContractConfig::default())
    }
}

impl ChannelContract {
    pub fn new(config: &ContractConfig) -> Self {
        Self {
            entries: ENTRIES.iter().map(|entry| (entry.event, *entry)).collect(),
            shaper: PayloadShaper::new(config.excerpt_length),
        }
    }

    pub fn entry(&self, event: EventName) -> Option<&ContractEntry> {
        self.entries.get(&event)
    }

    /// All entries in the canonical table order
    pub fn entries(&self) -> impl Iterator<Item = &ContractEntry> + '_ {
        EventName::ALL
            .iter()
            .filter_map(move |event| self.entries.get(event))
    }

    pub fn shaper(&self) -> &PayloadShaper {
        &self.shaper
    }

    /// Channels an event about `entity` must be published on
    pub fn resolve_channels(
        &self,
        event: EventName,
        entity: &Entity,
    ) -> Result<ChannelList, ContractError> {
        let mut channels = ChannelList::new();
        match (event, entity) {
            (_, Entity::Content(item)) => channels.push(Channel::for_content(item.kind)),
            (_, Entity::Thread(_)) => channels.push(Channel::Forum),
            (_, Entity::Post(post)) => {
                let thread_id = post.thread_id.ok_or_else(|| no_channel(entity))?;
                channels.push(Channel::forum_thread(thread_id));
            }
            (_, Entity::Comment(comment)) => {
                channels.push(Channel::comments(comment.parent_kind, comment.parent_id))
            }
            (_, Entity::Product(_)) => channels.push(Channel::Shop),
            (_, Entity::Notification(notification)) => {
                channels.push(Channel::user(notification.recipient_id))
            }
            (EventName::MessagesRead, Entity::Message(message)) => {
                let sender = message.sender.as_ref().ok_or_else(|| no_channel(entity))?;
                channels.push(Channel::editorial_user(sender.id));
            }
            (_, Entity::Message(message)) => {
                channels.extend(message_channels(message)?);
            }
        }

        if channels.is_empty() {
            return Err(no_channel(entity));
        }
        Ok(channels)
    }

    /// Shape the payload for `event` about `entity`
    pub fn shape(&self, detection: &Detection) -> Result<Payload, ContractError> {
        let shaper = &self.shaper;
        match (&detection.event, &detection.entity) {
            (_, Entity::Content(item)) => shaper.content(item),
            (_, Entity::Thread(thread)) => shaper.thread(thread),
            (_, Entity::Post(post)) => shaper.reply(post),
            (_, Entity::Comment(comment)) => shaper.comment(comment),
            (_, Entity::Product(product)) => shaper.stock(product),
            (_, Entity::Notification(notification)) => shaper.notification(notification),
            (EventName::MessagesRead, Entity::Message(message)) => {
                shaper.read_receipt(message, detection.actor.user_id)
            }
            (_, Entity::Message(message)) => shaper.message(message),
        }
    }

    /// Turn a detection into publishable events, one per target channel.
    ///
    /// Every event excludes the originating connection.
    pub fn route(&self, detection: &Detection) -> Result<Vec<BroadcastEvent>, ContractError> {
        let entry = self
            .entry(detection.event)
            .ok_or_else(|| ContractError::UnregisteredKind {
                kind: detection.kind().to_string(),
            })?;
        if entry.kind != detection.kind() {
            return Err(ContractError::UnregisteredKind {
                kind: detection.kind().to_string(),
            });
        }

        let channels = self.resolve_channels(detection.event, &detection.entity)?;
        let payload = self.shape(detection)?;

        Ok(channels
            .into_iter()
            .map(|channel| {
                BroadcastEvent::new(channel, detection.event, payload.clone())
                    .to_others(detection.actor.connection)
            })
            .collect())
    }
}

fn message_channels(message: &EditorialMessage) -> Result<ChannelList, ContractError> {
    if !message.recipients.is_empty() {
        let mut recipients = message.recipients.clone();
        recipients.sort_unstable();
        recipients.dedup();
        return Ok(recipients.into_iter().map(Channel::editorial_user).collect());
    }
    match &message.group {
        Some(group) => Ok(SmallVec::from_elem(Channel::editorial_group(group.clone())?, 1)),
        None => Ok(ChannelList::new()),
    }
}

fn no_channel(entity: &Entity) -> ContractError {
    ContractError::NoChannel {
        kind: entity.kind().to_string(),
        entity_id: entity.id(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DefaultDetector, TransitionDetector};
    use crate::entity::{
        Actor, Comment, CommentableKind, ForumPost, ModerationStatus, Transition, UserRecord,
    };
    use crate::types::{ConnectionId, EntityId, Timestamp, UserId};

    fn at() -> Timestamp {
        Timestamp::from_millis(0)
    }

    fn message(recipients: Vec<u64>, group: Option<&str>) -> EditorialMessage {
        EditorialMessage {
            id: EntityId::new(50),
            sender: Some(UserRecord::new(UserId::new(1), "Editor")),
            recipients: recipients.into_iter().map(UserId::new).collect(),
            group: group.map(str::to_string),
            subject: Some("Hello".into()),
            body: "Body".into(),
            created_at: at(),
            read_at: None,
        }
    }

    #[test]
    fn test_table_covers_every_event() {
        let contract = ChannelContract::default();
        assert_eq!(contract.entries().count(), EventName::ALL.len());
        for event in EventName::ALL {
            assert!(contract.entry(event).is_some(), "{event} missing from contract");
        }
    }

    #[test]
    fn test_message_resolves_to_each_recipient() {
        let contract = ChannelContract::default();
        let entity = Entity::Message(message(vec![3, 2, 3], None));
        let channels = contract
            .resolve_channels(EventName::MessageSent, &entity)
            .unwrap();
        let names: Vec<String> = channels.iter().map(Channel::name).collect();
        assert_eq!(names, vec!["editorial.user.2", "editorial.user.3"]);
    }

    #[test]
    fn test_message_without_recipient_uses_group() {
        let contract = ChannelContract::default();
        let entity = Entity::Message(message(vec![], Some("writers")));
        let channels = contract
            .resolve_channels(EventName::MessageSent, &entity)
            .unwrap();
        assert_eq!(channels.as_slice(), &[Channel::EditorialGroup("writers".into())]);

        let nowhere = Entity::Message(message(vec![], None));
        assert!(matches!(
            contract.resolve_channels(EventName::MessageSent, &nowhere),
            Err(ContractError::NoChannel { .. })
        ));
    }

    #[test]
    fn test_read_receipt_goes_back_to_sender() {
        let contract = ChannelContract::default();
        let entity = Entity::Message(message(vec![9], None));
        let channels = contract
            .resolve_channels(EventName::MessagesRead, &entity)
            .unwrap();
        assert_eq!(channels.as_slice(), &[Channel::editorial_user(UserId::new(1))]);
    }

    #[test]
    fn test_route_excludes_originating_connection() {
        let contract = ChannelContract::default();
        let origin = ConnectionId::new();
        let comment = Entity::Comment(Comment {
            id: EntityId::new(77),
            parent_kind: CommentableKind::Guide,
            parent_id: EntityId::new(5),
            reply_to: None,
            body: "nice".into(),
            status: ModerationStatus::Approved,
            author: None,
            created_at: at(),
        });
        let transition =
            Transition::created(comment).by(Actor::user(UserId::new(4)).on_connection(origin));
        let detection = DefaultDetector.detect(&transition).unwrap();

        let events = contract.route(&detection).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].channel.name(), "comments.guides.5");
        assert_eq!(events[0].event, EventName::CommentPosted);
        assert_eq!(events[0].exclude, Some(origin));
        assert_eq!(events[0].entity_id(), Some(77));
    }

    #[test]
    fn test_route_rejects_mismatched_kind() {
        let contract = ChannelContract::default();
        let detection = Detection {
            event: EventName::ArticlePublished,
            entity: Entity::Post(ForumPost {
                id: EntityId::new(1),
                thread_id: Some(EntityId::new(2)),
                body: "x".into(),
                author: None,
                created_at: at(),
            }),
            actor: Actor::system(),
        };
        assert!(matches!(
            contract.route(&detection),
            Err(ContractError::UnregisteredKind { .. })
        ));
    }
}
