//! Client channel subscriber
//!
//! One generic subscribe-merge-dedup primitive shared by every feature area.
//! A subscriber is hydrated from the REST catch-up fetch, then merges pushed
//! events by id. Feature areas differ only in where new items land and what
//! happens when a pushed id is already known.

use std::collections::VecDeque;

use hashbrown::HashSet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::Channel;
use crate::errors::SubscriberError;
use crate::event::{EventName, Payload};

// ----------------------------------------------------------------------------
// Subscription Spec
// ----------------------------------------------------------------------------

/// Anything with a stable id the subscriber can deduplicate on
pub trait Identified {
    fn id(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePosition {
    /// Newest first (feeds, listings, inboxes)
    Head,
    /// Chronological (thread replies)
    Tail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// A pushed id already in the list is a no-op
    Ignore,
    /// A pushed id already in the list replaces the entry in place
    Replace,
}

/// Channels, events and merge behaviour of one subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    pub channels: Vec<Channel>,
    pub events: Vec<EventName>,
    pub position: MergePosition,
    pub duplicates: DuplicatePolicy,
    pub max_items: usize,
}

impl SubscriptionSpec {
    pub fn new(channels: Vec<Channel>, events: Vec<EventName>) -> Self {
        Self {
            channels,
            events,
            position: MergePosition::Head,
            duplicates: DuplicatePolicy::Ignore,
            max_items: 100,
        }
    }

    pub fn at(mut self, position: MergePosition) -> Self {
        self.position = position;
        self
    }

    pub fn on_duplicate(mut self, duplicates: DuplicatePolicy) -> Self {
        self.duplicates = duplicates;
        self
    }

    pub fn max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    pub fn listens_to(&self, channel: &Channel, event: EventName) -> bool {
        self.channels.contains(channel) && self.events.contains(&event)
    }
}

/// Result of merging one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Duplicate,
}

// ----------------------------------------------------------------------------
// Subscriber
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct ChannelSubscriber<T> {
    spec: SubscriptionSpec,
    items: VecDeque<T>,
    known: HashSet<u64>,
    unseen: usize,
    active: bool,
}

impl<T> ChannelSubscriber<T>
where
    T: Identified + DeserializeOwned,
{
    pub fn new(spec: SubscriptionSpec) -> Self {
        Self {
            spec,
            items: VecDeque::new(),
            known: HashSet::new(),
            unseen: 0,
            active: true,
        }
    }

    pub fn spec(&self) -> &SubscriptionSpec {
        &self.spec
    }

    pub fn channels(&self) -> &[Channel] {
        &self.spec.channels
    }

    /// Replace the list with catch-up state.
    ///
    /// Fetched items are the ground truth and arrive in display order.
    /// Duplicate ids in the fetch keep their first occurrence. An oversized
    /// fetch is trimmed from the same end live eviction trims. The unseen
    /// count is left alone.
    pub fn hydrate(&mut self, fetched: Vec<T>) {
        self.items.clear();
        self.known.clear();
        for item in fetched {
            if self.known.insert(item.id()) {
                self.items.push_back(item);
            }
        }
        self.evict_overflow();
    }

    /// Merge one pushed event
    pub fn apply(
        &mut self,
        channel: &Channel,
        event: EventName,
        payload: &Payload,
    ) -> Result<MergeOutcome, SubscriberError> {
        if !self.active {
            return Err(SubscriberError::TornDown);
        }
        if !self.spec.channels.contains(channel) {
            return Err(SubscriberError::UnsubscribedChannel {
                channel: channel.name(),
            });
        }
        if !self.spec.events.contains(&event) {
            return Err(SubscriberError::UnhandledEvent {
                event: event.to_string(),
            });
        }

        let item: T = serde_json::from_value(Value::Object(payload.clone())).map_err(|e| {
            SubscriberError::Decode {
                reason: e.to_string(),
            }
        })?;
        Ok(self.merge(item))
    }

    /// Merge an already-decoded item by id
    pub fn merge(&mut self, item: T) -> MergeOutcome {
        let id = item.id();
        if self.known.contains(&id) {
            return match self.spec.duplicates {
                DuplicatePolicy::Ignore => MergeOutcome::Duplicate,
                DuplicatePolicy::Replace => {
                    if let Some(slot) = self.items.iter_mut().find(|existing| existing.id() == id) {
                        *slot = item;
                    }
                    MergeOutcome::Replaced
                }
            };
        }

        self.known.insert(id);
        match self.spec.position {
            MergePosition::Head => self.items.push_front(item),
            MergePosition::Tail => self.items.push_back(item),
        }
        self.unseen += 1;
        self.evict_overflow();
        MergeOutcome::Inserted
    }

    fn evict_overflow(&mut self) {
        while self.items.len() > self.spec.max_items {
            // Drop from the end opposite to where new items land
            let evicted = match self.spec.position {
                MergePosition::Head => self.items.pop_back(),
                MergePosition::Tail => self.items.pop_front(),
            };
            if let Some(evicted) = evicted {
                self.known.remove(&evicted.id());
            }
        }
    }

    pub fn items(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.known.contains(&id)
    }

    pub fn unseen_count(&self) -> usize {
        self.unseen
    }

    pub fn reset_unseen(&mut self) {
        self.unseen = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Stop listening; later pushes are rejected
    pub fn teardown(&mut self) {
        self.active = false;
    }
}

// ----------------------------------------------------------------------------
// Generic Entry
// ----------------------------------------------------------------------------

/// Untyped list entry: the payload's `id` plus every other field as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: u64,
    #[serde(flatten)]
    pub fields: Payload,
}

impl FeedEntry {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

impl Identified for FeedEntry {
    fn id(&self) -> u64 {
        self.id
    }
}
