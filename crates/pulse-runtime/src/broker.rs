//! In-memory broker
//!
//! Models both sides of the pub/sub fabric: publishers hand it
//! [`BroadcastEvent`]s, and client connections subscribe to channels and
//! receive [`Delivery`] values on a bounded per-connection inbox.
//!
//! Channels live in a sharded concurrent map, so publishes to different
//! channels never contend on a common lock. A full or closed inbox drops the
//! delivery for that connection only.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use pulse_core::{
    BroadcastEvent, Channel, ConnectionId, EventName, Payload, TransportError, UserId,
};

use crate::transport::{BroadcastTransport, PublishReport};

/// Default per-connection inbox capacity
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

// ----------------------------------------------------------------------------
// Deliveries
// ----------------------------------------------------------------------------

/// One event as seen by a subscribed connection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub channel: Channel,
    pub event: EventName,
    pub payload: Payload,
}

pub type DeliveryReceiver = mpsc::Receiver<Delivery>;

#[derive(Debug)]
struct Connection {
    user_id: Option<UserId>,
    inbox: mpsc::Sender<Delivery>,
    channels: HashSet<Channel>,
}

/// Counters kept by the broker
#[derive(Debug, Default)]
struct BrokerCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    excluded: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the broker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    pub connections: usize,
    pub channels: usize,
    pub published: u64,
    pub delivered: u64,
    pub excluded: u64,
    pub dropped: u64,
}

// ----------------------------------------------------------------------------
// Memory Broker
// ----------------------------------------------------------------------------

#[derive(Debug)]
struct BrokerInner {
    connections: DashMap<ConnectionId, Connection>,
    channels: DashMap<Channel, HashSet<ConnectionId>>,
    inbox_capacity: usize,
    counters: BrokerCounters,
}

/// Cheaply cloneable handle to a shared in-memory broker
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_inbox_capacity(DEFAULT_INBOX_CAPACITY)
    }

    pub fn with_inbox_capacity(inbox_capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                connections: DashMap::new(),
                channels: DashMap::new(),
                inbox_capacity: inbox_capacity.max(1),
                counters: BrokerCounters::default(),
            }),
        }
    }

    /// Open a connection bound to an optional authenticated identity
    pub fn connect(&self, user_id: Option<UserId>) -> (ConnectionId, DeliveryReceiver) {
        let connection_id = ConnectionId::new();
        let (inbox, receiver) = mpsc::channel(self.inner.inbox_capacity);
        self.inner.connections.insert(
            connection_id,
            Connection {
                user_id,
                inbox,
                channels: HashSet::new(),
            },
        );
        debug!(connection_id = %connection_id, user_id = ?user_id, "Connection opened");
        (connection_id, receiver)
    }

    /// Subscribe a connection to a channel, authorizing private and group
    /// channels against the connection's identity
    pub fn subscribe(
        &self,
        connection_id: ConnectionId,
        channel: Channel,
    ) -> Result<(), TransportError> {
        let mut connection = self
            .inner
            .connections
            .get_mut(&connection_id)
            .ok_or(TransportError::ConnectionNotFound { connection_id })?;

        if !channel.authorize(connection.user_id) {
            warn!(
                connection_id = %connection_id,
                channel = %channel,
                "Subscription rejected"
            );
            return Err(TransportError::Unauthorized {
                connection_id,
                channel: channel.name(),
            });
        }

        // Channel membership must be recorded before the connection entry is released
        connection.channels.insert(channel.clone());
        self.inner
            .channels
            .entry(channel.clone())
            .or_default()
            .insert(connection_id);
        drop(connection);

        debug!(connection_id = %connection_id, channel = %channel, "Subscribed");
        Ok(())
    }

    /// Returns whether the connection was subscribed
    pub fn unsubscribe(&self, connection_id: ConnectionId, channel: &Channel) -> bool {
        if let Some(mut connection) = self.inner.connections.get_mut(&connection_id) {
            connection.channels.remove(channel);
        }
        self.remove_member(channel, connection_id)
    }

    /// Drop a connection and every subscription it holds
    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        let Some((_, connection)) = self.inner.connections.remove(&connection_id) else {
            return false;
        };
        for channel in &connection.channels {
            self.remove_member(channel, connection_id);
        }
        debug!(connection_id = %connection_id, "Connection closed");
        true
    }

    fn remove_member(&self, channel: &Channel, connection_id: ConnectionId) -> bool {
        let removed = self
            .inner
            .channels
            .get_mut(channel)
            .is_some_and(|mut members| members.remove(&connection_id));
        self.inner
            .channels
            .remove_if(channel, |_, members| members.is_empty());
        removed
    }

    pub fn subscriber_count(&self, channel: &Channel) -> usize {
        self.inner
            .channels
            .get(channel)
            .map_or(0, |members| members.len())
    }

    pub fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.inner.connections.contains_key(&connection_id)
    }

    pub fn stats(&self) -> BrokerStats {
        let counters = &self.inner.counters;
        BrokerStats {
            connections: self.inner.connections.len(),
            channels: self.inner.channels.len(),
            published: counters.published.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            excluded: counters.excluded.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
        }
    }

    fn fan_out(&self, event: &BroadcastEvent) -> PublishReport {
        // Snapshot membership so no channel shard is held while sending
        let members: Vec<ConnectionId> = match self.inner.channels.get(&event.channel) {
            Some(members) => members.iter().copied().collect(),
            None => {
                trace!(channel = %event.channel, "No subscribers for channel");
                return PublishReport::default();
            }
        };

        let mut report = PublishReport::default();
        for connection_id in members {
            if event.exclude == Some(connection_id) {
                report.excluded += 1;
                continue;
            }
            let Some(inbox) = self
                .inner
                .connections
                .get(&connection_id)
                .map(|connection| connection.inbox.clone())
            else {
                continue;
            };

            let delivery = Delivery {
                channel: event.channel.clone(),
                event: event.event,
                payload: event.payload.clone(),
            };
            match inbox.try_send(delivery) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(connection_id = %connection_id, channel = %event.channel, "Inbox full, delivery dropped");
                    report.dropped += 1;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(connection_id = %connection_id, "Inbox closed, delivery dropped");
                    report.dropped += 1;
                }
            }
        }
        report
    }
}

#[async_trait]
impl BroadcastTransport for MemoryBroker {
    async fn publish(&self, event: &BroadcastEvent) -> Result<PublishReport, TransportError> {
        let report = self.fan_out(event);

        let counters = &self.inner.counters;
        counters.published.fetch_add(1, Ordering::Relaxed);
        counters
            .delivered
            .fetch_add(report.delivered as u64, Ordering::Relaxed);
        counters
            .excluded
            .fetch_add(report.excluded as u64, Ordering::Relaxed);
        counters
            .dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);

        trace!(
            channel = %event.channel,
            event = %event.event,
            delivered = report.delivered,
            excluded = report.excluded,
            "Published"
        );
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::EntityId;
    use serde_json::json;

    fn event(channel: Channel, id: u64) -> BroadcastEvent {
        let mut payload = Payload::new();
        payload.insert("id".into(), json!(id));
        BroadcastEvent::new(channel, EventName::ReplyPosted, payload)
    }

    #[tokio::test]
    async fn test_publish_skips_excluded_connection() {
        let broker = MemoryBroker::new();
        let thread = Channel::forum_thread(EntityId::new(1));
        let (author, mut author_rx) = broker.connect(Some(UserId::new(1)));
        let (reader, mut reader_rx) = broker.connect(None);
        broker.subscribe(author, thread.clone()).unwrap();
        broker.subscribe(reader, thread.clone()).unwrap();

        let report = broker
            .publish(&event(thread.clone(), 5).to_others(Some(author)))
            .await
            .unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.excluded, 1);

        let delivery = reader_rx.try_recv().unwrap();
        assert_eq!(delivery.channel, thread);
        assert_eq!(delivery.payload["id"], json!(5));
        assert!(author_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_private_channels_need_their_owner() {
        let broker = MemoryBroker::new();
        let owner = UserId::new(7);
        let (anonymous, _rx1) = broker.connect(None);
        let (stranger, _rx2) = broker.connect(Some(UserId::new(8)));
        let (me, _rx3) = broker.connect(Some(owner));

        let inbox = Channel::user(owner);
        assert!(matches!(
            broker.subscribe(anonymous, inbox.clone()),
            Err(TransportError::Unauthorized { .. })
        ));
        assert!(matches!(
            broker.subscribe(stranger, inbox.clone()),
            Err(TransportError::Unauthorized { .. })
        ));
        broker.subscribe(me, inbox.clone()).unwrap();
        assert_eq!(broker.subscriber_count(&inbox), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_disconnect_clean_up() {
        let broker = MemoryBroker::new();
        let (connection, _rx) = broker.connect(None);
        broker.subscribe(connection, Channel::News).unwrap();
        broker.subscribe(connection, Channel::Shop).unwrap();

        assert!(broker.unsubscribe(connection, &Channel::News));
        assert!(!broker.unsubscribe(connection, &Channel::News));
        assert_eq!(broker.subscriber_count(&Channel::News), 0);

        assert!(broker.disconnect(connection));
        assert!(!broker.is_connected(connection));
        assert_eq!(broker.subscriber_count(&Channel::Shop), 0);
        assert_eq!(broker.stats().channels, 0);

        assert!(matches!(
            broker.subscribe(connection, Channel::News),
            Err(TransportError::ConnectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_full_inbox_drops_only_that_delivery() {
        let broker = MemoryBroker::with_inbox_capacity(1);
        let (slow, mut slow_rx) = broker.connect(None);
        broker.subscribe(slow, Channel::Forum).unwrap();

        broker.publish(&event(Channel::Forum, 1)).await.unwrap();
        let report = broker.publish(&event(Channel::Forum, 2)).await.unwrap();
        assert_eq!(report.dropped, 1);

        assert_eq!(slow_rx.try_recv().unwrap().payload["id"], json!(1));
        assert!(slow_rx.try_recv().is_err());
        assert_eq!(broker.stats().dropped, 1);
    }

    #[test]
    fn test_publish_from_sync_context() {
        let broker = MemoryBroker::new();
        let (connection, mut inbox) = broker.connect(None);
        broker.subscribe(connection, Channel::Guides).unwrap();

        let report = tokio_test::block_on(broker.publish(&event(Channel::Guides, 3))).unwrap();
        assert_eq!(report.delivered, 1);
        assert!(inbox.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let broker = MemoryBroker::new();
        let report = broker.publish(&event(Channel::Videos, 1)).await.unwrap();
        assert_eq!(report, PublishReport::default());
        assert_eq!(broker.stats().published, 1);
    }

    #[test]
    fn test_racing_subscribe_and_disconnect_leave_no_members() {
        let broker = MemoryBroker::new();
        for round in 0..200u64 {
            let (connection, _inbox) = broker.connect(None);
            let channel = Channel::forum_thread(EntityId::new(round));
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    let _ = broker.subscribe(connection, channel.clone());
                });
                scope.spawn(|| {
                    broker.disconnect(connection);
                });
            });
            assert_eq!(broker.subscriber_count(&channel), 0);
        }

        let stats = broker.stats();
        assert_eq!(stats.connections, 0);
        assert_eq!(stats.channels, 0);
    }
}
