//! Progress-state engine: XP, reputation, achievements and rank
//!
//! A sibling consumer of the same write transitions the broadcast path sees.
//! [`trigger_for`] maps a transition to the activity it represents; the
//! [`ProgressEngine`] applies it idempotently against a [`ProgressStore`].

pub mod achievement;
pub mod engine;
pub mod store;

pub use achievement::{
    default_achievements, Achievement, CounterKind, Rank, RankLadder, UserAchievement,
};
pub use engine::{BatchReport, ProgressEngine, ProgressReport, RankChange};
pub use store::{MemoryProgressStore, ProgressStore, UserProgress};

use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::config::ProgressConfig;
use crate::detector::{DefaultDetector, TransitionDetector};
use crate::entity::{ContentKind, Entity, Transition, WriteOperation};
use crate::event::EventName;
use crate::types::UserId;

// ----------------------------------------------------------------------------
// Triggers
// ----------------------------------------------------------------------------

/// User activity that moves progress counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "activity", rename_all = "snake_case")]
pub enum ProgressTrigger {
    PostCreated { user_id: UserId },
    PostDeleted { user_id: UserId },
    ThreadCreated { user_id: UserId },
    CommentPosted { user_id: UserId },
    ReviewPublished { user_id: UserId },
    FriendAdded { user_id: UserId },
}

impl ProgressTrigger {
    pub fn user_id(&self) -> UserId {
        match *self {
            ProgressTrigger::PostCreated { user_id }
            | ProgressTrigger::PostDeleted { user_id }
            | ProgressTrigger::ThreadCreated { user_id }
            | ProgressTrigger::CommentPosted { user_id }
            | ProgressTrigger::ReviewPublished { user_id }
            | ProgressTrigger::FriendAdded { user_id } => user_id,
        }
    }

    /// Relative counter changes this activity applies
    pub fn deltas(&self, config: &ProgressConfig) -> SmallVec<[(CounterKind, i64); 3]> {
        let signed = |value: u64| i64::try_from(value).unwrap_or(i64::MAX);
        match self {
            ProgressTrigger::PostCreated { .. } => smallvec![
                (CounterKind::Posts, 1),
                (CounterKind::Reputation, signed(config.post_reputation_delta)),
                (CounterKind::Xp, signed(config.post_xp_delta)),
            ],
            // XP earned is kept
            ProgressTrigger::PostDeleted { .. } => smallvec![
                (CounterKind::Posts, -1),
                (CounterKind::Reputation, -signed(config.post_reputation_delta)),
            ],
            ProgressTrigger::ThreadCreated { .. } => smallvec![
                (CounterKind::Threads, 1),
                (CounterKind::Xp, signed(config.thread_xp_delta)),
            ],
            ProgressTrigger::CommentPosted { .. } => smallvec![(CounterKind::Comments, 1)],
            ProgressTrigger::ReviewPublished { .. } => smallvec![
                (CounterKind::Reviews, 1),
                (CounterKind::Xp, signed(config.review_xp_delta)),
            ],
            ProgressTrigger::FriendAdded { .. } => smallvec![(CounterKind::Friends, 1)],
        }
    }
}

/// The progress activity a write represents, credited to the entity's author
pub fn trigger_for(transition: &Transition) -> Option<ProgressTrigger> {
    let user_id = transition.after.author_id()?;
    match (transition.operation, &transition.after) {
        (WriteOperation::Create, Entity::Post(_)) => Some(ProgressTrigger::PostCreated { user_id }),
        (WriteOperation::Delete, Entity::Post(_)) => Some(ProgressTrigger::PostDeleted { user_id }),
        (WriteOperation::Create, Entity::Thread(_)) => {
            Some(ProgressTrigger::ThreadCreated { user_id })
        }
        // Comments and reviews count once, when they first become visible
        (_, Entity::Comment(_)) => match DefaultDetector.detect(transition)?.event {
            EventName::CommentPosted => Some(ProgressTrigger::CommentPosted { user_id }),
            _ => None,
        },
        (_, Entity::Content(item)) if item.kind == ContentKind::Review => {
            match DefaultDetector.detect(transition)?.event {
                EventName::ReviewPublished => Some(ProgressTrigger::ReviewPublished { user_id }),
                _ => None,
            }
        }
        _ => None,
    }
}
