//! Typed channel builders
//!
//! Channel names are a byte-for-byte contract between server and client.
//! Every name is produced by one of the builders here and can be parsed back
//! with [`Channel::parse`], so the naming scheme lives in exactly one place.
//!
//! | Channel | Visibility |
//! |---|---|
//! | `news`, `reviews`, `guides`, `videos`, `forum`, `shop` | public |
//! | `forum.thread.{thread_id}` | scoped |
//! | `comments.{parent_kind_plural}.{parent_id}` | scoped |
//! | `user.{user_id}` | private |
//! | `editorial.user.{user_id}` | private |
//! | `editorial.channel.{name}` | scoped |

use core::fmt;
use serde::{Deserialize, Serialize};

use crate::entity::{CommentableKind, ContentKind};
use crate::errors::ContractError;
use crate::types::{EntityId, UserId};

// ----------------------------------------------------------------------------
// Visibility
// ----------------------------------------------------------------------------

/// Who may subscribe to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Anyone, authenticated or not
    Public,
    /// Keyed by a parent entity (thread, content item, group)
    Scoped,
    /// Keyed by a single user; only that user may subscribe
    Private,
}

// ----------------------------------------------------------------------------
// Channel
// ----------------------------------------------------------------------------

/// A pub/sub topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    News,
    Reviews,
    Guides,
    Videos,
    Forum,
    Shop,
    ForumThread(EntityId),
    Comments {
        parent_kind: CommentableKind,
        parent_id: EntityId,
    },
    User(UserId),
    EditorialUser(UserId),
    EditorialGroup(String),
}

impl Channel {
    /// Fixed public channel for a content type
    pub fn for_content(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Article => Channel::News,
            ContentKind::Review => Channel::Reviews,
            ContentKind::Guide => Channel::Guides,
            ContentKind::Video => Channel::Videos,
        }
    }

    pub fn forum_thread(thread_id: EntityId) -> Self {
        Channel::ForumThread(thread_id)
    }

    pub fn comments(parent_kind: CommentableKind, parent_id: EntityId) -> Self {
        Channel::Comments {
            parent_kind,
            parent_id,
        }
    }

    pub fn user(user_id: UserId) -> Self {
        Channel::User(user_id)
    }

    pub fn editorial_user(user_id: UserId) -> Self {
        Channel::EditorialUser(user_id)
    }

    /// Group channel for editorial broadcasts; the name must be a single segment
    pub fn editorial_group(name: impl Into<String>) -> Result<Self, ContractError> {
        let name = name.into();
        if !is_valid_segment(&name) {
            return Err(ContractError::InvalidChannelName {
                name: format!("editorial.channel.{name}"),
            });
        }
        Ok(Channel::EditorialGroup(name))
    }

    pub fn visibility(&self) -> Visibility {
        match self {
            Channel::News
            | Channel::Reviews
            | Channel::Guides
            | Channel::Videos
            | Channel::Forum
            | Channel::Shop => Visibility::Public,
            Channel::ForumThread(_) | Channel::Comments { .. } | Channel::EditorialGroup(_) => {
                Visibility::Scoped
            }
            Channel::User(_) | Channel::EditorialUser(_) => Visibility::Private,
        }
    }

    /// The user a private channel belongs to
    pub fn owner(&self) -> Option<UserId> {
        match self {
            Channel::User(id) | Channel::EditorialUser(id) => Some(*id),
            _ => None,
        }
    }

    /// Whether `user` may subscribe.
    ///
    /// Private channels admit only their owner. Editorial group channels
    /// admit any authenticated user; group membership is checked upstream.
    pub fn authorize(&self, user: Option<UserId>) -> bool {
        match self {
            Channel::User(owner) | Channel::EditorialUser(owner) => user == Some(*owner),
            Channel::EditorialGroup(_) => user.is_some(),
            _ => true,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Channel::News => "news".to_string(),
            Channel::Reviews => "reviews".to_string(),
            Channel::Guides => "guides".to_string(),
            Channel::Videos => "videos".to_string(),
            Channel::Forum => "forum".to_string(),
            Channel::Shop => "shop".to_string(),
            Channel::ForumThread(thread_id) => format!("forum.thread.{thread_id}"),
            Channel::Comments {
                parent_kind,
                parent_id,
            } => format!("comments.{}.{parent_id}", parent_kind.plural()),
            Channel::User(user_id) => format!("user.{user_id}"),
            Channel::EditorialUser(user_id) => format!("editorial.user.{user_id}"),
            Channel::EditorialGroup(name) => format!("editorial.channel.{name}"),
        }
    }

    /// Parse a wire channel name back into its typed form
    pub fn parse(name: &str) -> Result<Self, ContractError> {
        let invalid = || ContractError::InvalidChannelName {
            name: name.to_string(),
        };
        let segments: Vec<&str> = name.split('.').collect();

        let channel = match segments.as_slice() {
            ["news"] => Channel::News,
            ["reviews"] => Channel::Reviews,
            ["guides"] => Channel::Guides,
            ["videos"] => Channel::Videos,
            ["forum"] => Channel::Forum,
            ["shop"] => Channel::Shop,
            ["forum", "thread", id] => Channel::ForumThread(parse_id(id).ok_or_else(invalid)?),
            ["comments", plural, id] => Channel::Comments {
                parent_kind: CommentableKind::from_plural(plural).ok_or_else(invalid)?,
                parent_id: parse_id(id).ok_or_else(invalid)?,
            },
            ["user", id] => Channel::User(UserId::new(
                parse_id(id).ok_or_else(invalid)?.get(),
            )),
            ["editorial", "user", id] => Channel::EditorialUser(UserId::new(
                parse_id(id).ok_or_else(invalid)?.get(),
            )),
            ["editorial", "channel", group] if is_valid_segment(group) => {
                Channel::EditorialGroup((*group).to_string())
            }
            _ => return Err(invalid()),
        };
        Ok(channel)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.name()
    }
}

impl TryFrom<String> for Channel {
    type Error = ContractError;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Channel::parse(&name)
    }
}

fn parse_id(segment: &str) -> Option<EntityId> {
    // Reject "+1", "01" and friends so parse(name) always round-trips
    if segment.is_empty()
        || !segment.bytes().all(|b| b.is_ascii_digit())
        || (segment.len() > 1 && segment.starts_with('0'))
    {
        return None;
    }
    segment.parse::<u64>().ok().map(EntityId::new)
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}
