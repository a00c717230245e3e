//! End-to-end fabric tests
//!
//! Writes go in through the fabric, events come out of the in-memory broker
//! and land in client subscribers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pulse_core::{
    Actor, Channel, ContentItem, ContentKind, DispatchConfig, Entity, EntityId, FeatureArea,
    FeedEntry, ForumPost, MergeOutcome, MockTimeSource, NotificationRecord, PulseConfig,
    PulseError, PublishStatus, Result, SubscriberConfig, SubscriptionSpec, Timestamp,
    Transition, TransportError, UserId, UserRecord,
};
use pulse_runtime::{
    create_test_fabric, BroadcastEvent, BroadcastTransport, CatchUpSource, ClientSession,
    Dispatcher, FabricBuilder, MemoryBroker, MemoryNotificationSink, Notification,
    NotificationSink, PublishReport,
};
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

const SETTLE: Duration = Duration::from_secs(2);

fn member(id: u64) -> UserRecord {
    UserRecord::new(UserId::new(id), format!("member-{id}"))
}

fn reply(id: u64, thread_id: u64, author: u64) -> Entity {
    Entity::Post(ForumPost {
        id: EntityId::new(id),
        thread_id: Some(EntityId::new(thread_id)),
        body: "I agree".into(),
        author: Some(member(author)),
        created_at: Timestamp::from_millis(0),
    })
}

fn article(id: u64) -> Entity {
    let mut item = ContentItem::new(
        EntityId::new(id),
        ContentKind::Article,
        format!("Patch notes {id}"),
        Timestamp::from_millis(0),
    );
    item.status = PublishStatus::Published;
    Entity::Content(item)
}

fn entry(id: u64) -> FeedEntry {
    FeedEntry {
        id,
        fields: Default::default(),
    }
}

/// Catch-up source backed by a mutable list
#[derive(Default)]
struct ListSource {
    items: Mutex<Vec<FeedEntry>>,
    fail: Mutex<bool>,
}

impl ListSource {
    fn with(ids: &[u64]) -> Arc<Self> {
        let source = Self::default();
        *source.items.lock().unwrap() = ids.iter().copied().map(entry).collect();
        Arc::new(source)
    }

    fn set(&self, ids: &[u64]) {
        *self.items.lock().unwrap() = ids.iter().copied().map(entry).collect();
    }
}

#[async_trait]
impl CatchUpSource<FeedEntry> for ListSource {
    async fn fetch(&self, _spec: &SubscriptionSpec) -> Result<Vec<FeedEntry>> {
        if *self.fail.lock().unwrap() {
            return Err(PulseError::unavailable("catch-up endpoint down"));
        }
        Ok(self.items.lock().unwrap().clone())
    }
}

#[tokio::test]
async fn test_author_does_not_receive_their_own_reply() {
    let mut handle = create_test_fabric().await.expect("fabric should start");
    let broker = handle.broker().expect("memory broker").clone();
    let thread = Channel::forum_thread(EntityId::new(8));

    let (author, mut author_inbox) = broker.connect(Some(UserId::new(1)));
    let (reader, mut reader_inbox) = broker.connect(Some(UserId::new(2)));
    broker.subscribe(author, thread.clone()).unwrap();
    broker.subscribe(reader, thread.clone()).unwrap();

    let actor = Actor::user(UserId::new(1)).on_connection(author);
    let outcome = handle.on_write(&Transition::created(reply(50, 8, 1)).by(actor));
    assert_eq!(outcome.enqueued, 1);
    assert!(handle.settle(SETTLE).await);

    let delivery = reader_inbox.try_recv().expect("reader should get the reply");
    assert_eq!(delivery.channel, thread);
    assert_eq!(delivery.payload["id"], json!(50));
    assert!(author_inbox.try_recv().is_err());

    handle.shutdown().await.unwrap();
    let broker_stats = handle.stats().broker.expect("broker stats");
    assert_eq!(broker_stats.delivered, 1);
    assert_eq!(broker_stats.excluded, 1);
}

#[tokio::test]
async fn test_writes_feed_the_progress_engine() {
    let mut handle = create_test_fabric().await.expect("fabric should start");
    let engine = handle.progress().expect("progress engine").clone();
    let user_id = UserId::new(1);

    for id in 1..=10 {
        handle.on_write(&Transition::created(reply(id, 8, 1)));
    }
    let unlocked: Vec<u64> = engine
        .store()
        .achievements(user_id)
        .unwrap()
        .into_iter()
        .map(|record| record.achievement_id)
        .collect();
    assert!(unlocked.contains(&1));
    assert!(unlocked.contains(&2));

    let progress = engine.store().progress(user_id).unwrap();
    assert_eq!(progress.posts, 10);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_publishes_to_different_channels_run_concurrently() {
    let broker = MemoryBroker::new();
    let channels: Vec<Channel> = (1..=16)
        .map(|id| Channel::forum_thread(EntityId::new(id)))
        .collect();
    let mut inboxes = Vec::new();
    for channel in &channels {
        let (connection, inbox) = broker.connect(None);
        broker.subscribe(connection, channel.clone()).unwrap();
        inboxes.push(inbox);
    }

    let events: Vec<BroadcastEvent> = channels
        .iter()
        .map(|channel| {
            BroadcastEvent::new(
                channel.clone(),
                pulse_core::EventName::ReplyPosted,
                Default::default(),
            )
        })
        .collect();
    let reports = futures::future::join_all(events.iter().map(|event| broker.publish(event))).await;
    assert!(reports
        .iter()
        .all(|report| matches!(report, Ok(report) if report.delivered == 1)));

    for mut inbox in inboxes {
        let delivery = inbox.try_recv().expect("each channel delivers once");
        assert!(inbox.try_recv().is_err());
        assert_eq!(delivery.event, pulse_core::EventName::ReplyPosted);
    }
}

/// Blocks every publish until released
struct GatedTransport {
    entered: Notify,
    release: Semaphore,
}

#[async_trait]
impl BroadcastTransport for GatedTransport {
    async fn publish(
        &self,
        _event: &BroadcastEvent,
    ) -> std::result::Result<PublishReport, TransportError> {
        self.entered.notify_one();
        let permit = self
            .release
            .acquire()
            .await
            .map_err(|_| TransportError::Shutdown {
                reason: "gate closed".into(),
            })?;
        permit.forget();
        Ok(PublishReport::default())
    }

    fn name(&self) -> &'static str {
        "gated"
    }
}

#[tokio::test]
async fn test_full_queue_drops_without_blocking_the_write() {
    let transport = Arc::new(GatedTransport {
        entered: Notify::new(),
        release: Semaphore::new(0),
    });
    let config = DispatchConfig {
        queue_capacity: 1,
        publish_timeout_ms: 5_000,
        ..DispatchConfig::testing()
    };
    let (dispatcher, task) = Dispatcher::spawn(transport.clone(), config);
    let event = || {
        BroadcastEvent::new(
            Channel::News,
            pulse_core::EventName::ArticlePublished,
            Default::default(),
        )
    };

    dispatcher.enqueue(event()).unwrap();
    tokio::time::timeout(SETTLE, transport.entered.notified())
        .await
        .expect("first publish should start");

    dispatcher.enqueue(event()).unwrap();
    assert!(matches!(
        dispatcher.enqueue(event()),
        Err(TransportError::QueueFull { capacity: 1 })
    ));

    transport.release.add_permits(8);
    dispatcher.shutdown();
    tokio::time::timeout(SETTLE, task).await.unwrap().unwrap();

    let stats = dispatcher.stats();
    assert_eq!(stats.enqueued, 2);
    assert_eq!(stats.dropped, 1);
    assert_eq!(stats.published, 2);
}

#[tokio::test]
async fn test_fabric_swallows_dispatch_failures() {
    let transport = Arc::new(GatedTransport {
        entered: Notify::new(),
        release: Semaphore::new(0),
    });
    transport.release.close();

    let mut handle = FabricBuilder::new()
        .with_config(PulseConfig::testing())
        .with_transport(transport)
        .build_and_start()
        .await
        .expect("fabric should start");
    assert!(handle.broker().is_none());

    let outcome = handle.on_write(&Transition::created(article(1)));
    assert_eq!(outcome.enqueued, 1);
    assert!(handle.settle(SETTLE).await);
    assert_eq!(handle.stats().dispatch.failed, 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_session_hydrates_dedups_and_recovers_on_reconnect() {
    let mut handle = create_test_fabric().await.expect("fabric should start");
    let broker = handle.broker().expect("memory broker").clone();
    let source = ListSource::with(&[2, 1]);

    let mut feed = ClientSession::<FeedEntry>::mount_feature(
        broker.clone(),
        &FeatureArea::NewsFeed,
        &SubscriberConfig::default(),
        source.clone(),
    )
    .await
    .expect("session should mount");
    let ids = |session: &ClientSession<FeedEntry>| -> Vec<u64> {
        session.items().map(|item| item.id).collect()
    };
    assert_eq!(ids(&feed), vec![2, 1]);

    // Already hydrated: no growth
    handle.on_write(&Transition::created(article(2)));
    handle.on_write(&Transition::created(article(3)));
    assert!(handle.settle(SETTLE).await);
    let report = feed.drain();
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(ids(&feed), vec![3, 2, 1]);
    assert_eq!(feed.unseen_count(), 1);

    // Missed while disconnected; the catch-up fetch reconciles
    let old_connection = feed.connection_id();
    broker.disconnect(old_connection.expect("connected"));
    handle.on_write(&Transition::created(article(4)));
    assert!(handle.settle(SETTLE).await);
    source.set(&[4, 3, 2, 1]);
    feed.reconnect().await.expect("reconnect should succeed");
    assert_ne!(feed.connection_id(), old_connection);
    assert_eq!(ids(&feed), vec![4, 3, 2, 1]);

    handle.on_write(&Transition::created(article(5)));
    let outcome = tokio::time::timeout(SETTLE, feed.recv_and_merge())
        .await
        .expect("push should arrive");
    assert_eq!(outcome, Some(MergeOutcome::Inserted));
    assert_eq!(ids(&feed)[0], 5);

    feed.teardown();
    assert!(feed.connection_id().is_none());
    assert_eq!(broker.subscriber_count(&Channel::News), 0);
    assert!(feed.reconnect().await.is_err());
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_catch_up_keeps_the_session_usable() {
    let broker = MemoryBroker::new();
    let source = ListSource::with(&[1]);
    *source.fail.lock().unwrap() = true;

    let session = ClientSession::<FeedEntry>::mount_feature(
        broker.clone(),
        &FeatureArea::ShopListing,
        &SubscriberConfig::default(),
        source,
    )
    .await
    .expect("session should mount");
    assert!(session.subscriber().is_empty());
    assert_eq!(broker.subscriber_count(&Channel::Shop), 1);

    drop(session);
    assert_eq!(broker.subscriber_count(&Channel::Shop), 0);
}

#[tokio::test]
async fn test_private_channels_reject_other_identities() {
    let broker = MemoryBroker::new();
    let inbox = FeatureArea::NotificationInbox {
        user_id: UserId::new(31),
    };
    let spec = inbox.spec(&SubscriberConfig::default()).unwrap();

    let result = ClientSession::<FeedEntry>::mount(
        broker.clone(),
        Some(UserId::new(32)),
        spec,
        ListSource::with(&[]),
    )
    .await;
    assert!(matches!(
        result,
        Err(PulseError::Transport(TransportError::Unauthorized { .. }))
    ));
    assert_eq!(broker.stats().connections, 0);
}

/// Sink that always fails
struct BrokenSink;

#[async_trait]
impl NotificationSink for BrokenSink {
    async fn persist(&self, _record: &NotificationRecord) -> Result<()> {
        Err(PulseError::store_error("database unavailable"))
    }
}

#[tokio::test]
async fn test_notifications_are_pushed_even_when_persistence_fails() {
    let broker = MemoryBroker::new();
    let mut handle = FabricBuilder::new()
        .with_config(PulseConfig::testing())
        .with_broker(broker.clone())
        .with_notification_sink(Arc::new(BrokenSink))
        .with_time_source(Arc::new(MockTimeSource::new_at(1_700_000_000_000)))
        .build_and_start()
        .await
        .expect("fabric should start");

    let mut inbox = ClientSession::<FeedEntry>::mount_feature(
        broker.clone(),
        &FeatureArea::NotificationInbox {
            user_id: UserId::new(31),
        },
        &SubscriberConfig::default(),
        ListSource::with(&[]),
    )
    .await
    .expect("owner may subscribe");

    let record = handle
        .notifications()
        .notify(
            Notification::new(UserId::new(31), "friend_request", "Linus wants to be friends")
                .with_link("/friends"),
            Actor::system(),
        )
        .await;
    assert!(handle.settle(SETTLE).await);

    assert_eq!(inbox.drain().inserted, 1);
    let item = inbox.items().next().expect("notification listed");
    assert_eq!(item.id, record.id.get());
    assert_eq!(item.get("type"), Some(&json!("friend_request")));
    assert_eq!(item.get("link"), Some(&json!("/friends")));
    assert_eq!(item.get("timestamp"), Some(&json!("2023-11-14T22:13:20Z")));
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_notifications_are_persisted_and_addressed_individually() {
    let sink = Arc::new(MemoryNotificationSink::new());
    let mut handle = FabricBuilder::new()
        .with_config(PulseConfig::testing())
        .with_notification_sink(sink.clone())
        .build_and_start()
        .await
        .expect("fabric should start");

    let recipients = [UserId::new(1), UserId::new(2), UserId::new(3)];
    let records = handle
        .notifications()
        .notify_many(
            &recipients,
            Notification::new(UserId::new(0), "announcement", "Server maintenance tonight"),
            Actor::system(),
        )
        .await;
    assert!(handle.settle(SETTLE).await);

    assert_eq!(records.len(), 3);
    assert_eq!(sink.records().len(), 3);
    assert_eq!(sink.inbox(UserId::new(2)).len(), 1);
    let ids: std::collections::HashSet<_> = records.iter().map(|record| record.id).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(handle.stats().dispatch.published, 3);
    handle.shutdown().await.unwrap();
}
