//! Pulse Core
//!
//! Pure, synchronous domain logic of the Pulse publish/subscribe broadcast
//! fabric: entity snapshots and write transitions, the transition detector,
//! the channel/event contract with its typed channel builders and payload
//! shapers, the progress-state engine, and the client-side subscribe and
//! merge primitive. Nothing in this crate performs I/O; the runtime crate
//! wires it to a broker.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod channel;
pub mod config;
pub mod contract;
pub mod detector;
pub mod entity;
pub mod errors;
pub mod event;
pub mod feature;
pub mod payload;
pub mod progress;
pub mod subscriber;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use channel::{Channel, Visibility};
pub use config::{ContractConfig, DispatchConfig, ProgressConfig, PulseConfig, SubscriberConfig};
pub use contract::{ChannelContract, ChannelList, ContractEntry};
pub use detector::{DefaultDetector, Detection, TransitionDetector};
pub use entity::{
    Actor, Comment, CommentableKind, ContentItem, ContentKind, EditorialMessage, Entity,
    EntityKind, ForumPost, ForumThread, ModerationStatus, NotificationRecord, Product,
    PublishStatus, Transition, UserRecord, WriteOperation,
};
pub use errors::{
    ContractError, ProgressError, PulseError, PulseResult, Result, SubscriberError,
    TransportError,
};
pub use event::{BroadcastEvent, EventName, Payload};
pub use feature::FeatureArea;
pub use payload::{PayloadShaper, UserSummary, DEFAULT_EXCERPT_LENGTH};
pub use progress::{
    trigger_for, Achievement, BatchReport, CounterKind, MemoryProgressStore, ProgressEngine,
    ProgressReport, ProgressStore, ProgressTrigger, Rank, RankChange, RankLadder,
    UserAchievement, UserProgress,
};
pub use subscriber::{
    ChannelSubscriber, DuplicatePolicy, FeedEntry, Identified, MergeOutcome, MergePosition,
    SubscriptionSpec,
};
pub use types::{ConnectionId, EntityId, SystemTimeSource, TimeSource, Timestamp, UserId};

#[cfg(any(test, feature = "testing"))]
pub use types::MockTimeSource;
