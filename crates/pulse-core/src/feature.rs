//! Feature-area presets
//!
//! Each UI feature subscribes to a fixed set of channels and events. The
//! presets here are the only place that pairing is written down.

use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::config::SubscriberConfig;
use crate::entity::{CommentableKind, ContentKind};
use crate::errors::ContractError;
use crate::event::EventName;
use crate::subscriber::{DuplicatePolicy, MergePosition, SubscriptionSpec};
use crate::types::{EntityId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "feature", rename_all = "snake_case")]
pub enum FeatureArea {
    NewsFeed,
    ReviewsFeed,
    GuidesFeed,
    VideosFeed,
    ForumListing,
    ForumThread {
        thread_id: EntityId,
    },
    CommentSection {
        parent_kind: CommentableKind,
        parent_id: EntityId,
    },
    NotificationInbox {
        user_id: UserId,
    },
    ShopListing,
    /// Personal editorial channel plus any group channels the user belongs to
    EditorialInbox {
        user_id: UserId,
        groups: Vec<String>,
    },
}

impl FeatureArea {
    pub fn name(&self) -> &'static str {
        match self {
            FeatureArea::NewsFeed => "news_feed",
            FeatureArea::ReviewsFeed => "reviews_feed",
            FeatureArea::GuidesFeed => "guides_feed",
            FeatureArea::VideosFeed => "videos_feed",
            FeatureArea::ForumListing => "forum_listing",
            FeatureArea::ForumThread { .. } => "forum_thread",
            FeatureArea::CommentSection { .. } => "comment_section",
            FeatureArea::NotificationInbox { .. } => "notification_inbox",
            FeatureArea::ShopListing => "shop_listing",
            FeatureArea::EditorialInbox { .. } => "editorial_inbox",
        }
    }

    /// The private user a feature belongs to, if any
    pub fn owner(&self) -> Option<UserId> {
        match self {
            FeatureArea::NotificationInbox { user_id } | FeatureArea::EditorialInbox { user_id, .. } => {
                Some(*user_id)
            }
            _ => None,
        }
    }

    pub fn spec(&self, config: &SubscriberConfig) -> Result<SubscriptionSpec, ContractError> {
        let spec = match self {
            FeatureArea::NewsFeed => content_feed(ContentKind::Article, EventName::ArticlePublished),
            FeatureArea::ReviewsFeed => content_feed(ContentKind::Review, EventName::ReviewPublished),
            FeatureArea::GuidesFeed => content_feed(ContentKind::Guide, EventName::GuidePublished),
            FeatureArea::VideosFeed => content_feed(ContentKind::Video, EventName::VideoPublished),
            FeatureArea::ForumListing => {
                SubscriptionSpec::new(vec![Channel::Forum], vec![EventName::ThreadCreated])
            }
            FeatureArea::ForumThread { thread_id } => SubscriptionSpec::new(
                vec![Channel::forum_thread(*thread_id)],
                vec![EventName::ReplyPosted],
            )
            .at(MergePosition::Tail),
            FeatureArea::CommentSection {
                parent_kind,
                parent_id,
            } => SubscriptionSpec::new(
                vec![Channel::comments(*parent_kind, *parent_id)],
                vec![EventName::CommentPosted],
            ),
            FeatureArea::NotificationInbox { user_id } => SubscriptionSpec::new(
                vec![Channel::user(*user_id)],
                vec![EventName::NotificationReceived],
            ),
            FeatureArea::ShopListing => {
                SubscriptionSpec::new(vec![Channel::Shop], vec![EventName::ProductStockUpdated])
                    .on_duplicate(DuplicatePolicy::Replace)
            }
            FeatureArea::EditorialInbox { user_id, groups } => {
                let mut channels = vec![Channel::editorial_user(*user_id)];
                for group in groups {
                    channels.push(Channel::editorial_group(group.as_str())?);
                }
                SubscriptionSpec::new(channels, vec![EventName::MessageSent])
            }
        };
        Ok(spec.max_items(config.max_items))
    }
}

fn content_feed(kind: ContentKind, event: EventName) -> SubscriptionSpec {
    SubscriptionSpec::new(vec![Channel::for_content(kind)], vec![event])
}
