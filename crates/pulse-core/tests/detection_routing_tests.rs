//! Detection and routing scenarios
//!
//! Drives write transitions through the default detector and the channel
//! contract, checking the events that would reach the broker.

use pulse_core::{
    Actor, BroadcastEvent, ChannelContract, Comment, CommentableKind, ConnectionId, ContentItem,
    ContentKind, DefaultDetector, EditorialMessage, Entity, EntityId, EventName,
    ModerationStatus, NotificationRecord, Product, PublishStatus, Timestamp, Transition,
    TransitionDetector, UserId, UserRecord,
};
use serde_json::json;

fn route(transition: &Transition) -> Vec<BroadcastEvent> {
    let contract = ChannelContract::default();
    match DefaultDetector.detect(transition) {
        Some(detection) => contract.route(&detection).expect("detection should route"),
        None => Vec::new(),
    }
}

fn author() -> UserRecord {
    UserRecord::new(UserId::new(12), "Grace")
        .with_username("grace")
        .with_email("grace@example.com")
}

fn guide(status: PublishStatus, body: &str) -> Entity {
    let mut item = ContentItem::new(
        EntityId::new(70),
        ContentKind::Guide,
        "Speedrun Routing 101",
        Timestamp::from_millis(1_700_000_000_000),
    );
    item.status = status;
    item.body = Some(body.to_string());
    item.author = Some(author());
    item.difficulty = Some("advanced".into());
    item.rating = Some(4.5);
    Entity::Content(item)
}

fn product(stock: u32, description: &str) -> Entity {
    Entity::Product(Product {
        id: EntityId::new(5),
        name: "Arcade Stick".into(),
        slug: "arcade-stick".into(),
        description: Some(description.into()),
        stock,
        price_cents: 12_999,
        updated_at: Timestamp::from_millis(1_700_000_000_000),
    })
}

#[test]
fn test_publishing_fires_exactly_once() {
    let draft = guide(PublishStatus::Draft, "Body");
    let published = guide(PublishStatus::Published, "Body");
    let edited = guide(PublishStatus::Published, "Body, now longer");

    assert!(route(&Transition::created(draft.clone())).is_empty());

    let events = route(&Transition::updated(draft, published.clone()));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel.name(), "guides");
    assert_eq!(events[0].event, EventName::GuidePublished);

    assert!(route(&Transition::updated(published, edited)).is_empty());
}

#[test]
fn test_content_payload_hides_private_author_fields() {
    let events = route(&Transition::created(guide(PublishStatus::Published, "Body")));
    let payload = &events[0].payload;

    assert_eq!(payload["id"], json!(70));
    assert_eq!(payload["slug"], json!("speedrun-routing-101"));
    assert_eq!(payload["difficulty"], json!("advanced"));
    assert!(payload.get("rating").is_none());
    assert_eq!(
        payload["author"],
        json!({"id": 12, "name": "Grace", "username": "grace", "avatar": null})
    );
    let rendered = serde_json::to_string(payload).expect("payload serializes");
    assert!(!rendered.contains("grace@example.com"));
    assert!(!rendered.contains("remember_token"));
}

#[test]
fn test_stock_changes_publish_availability() {
    let events = route(&Transition::updated(product(5, "a"), product(0, "a")));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel.name(), "shop");
    assert_eq!(events[0].event, EventName::ProductStockUpdated);
    assert_eq!(events[0].payload["stock"], json!(0));
    assert_eq!(events[0].payload["is_available"], json!(false));

    assert!(route(&Transition::updated(product(5, "a"), product(5, "b"))).is_empty());
}

#[test]
fn test_comment_publishes_on_approval_to_parent_scope() {
    let comment = |status: ModerationStatus| {
        Entity::Comment(Comment {
            id: EntityId::new(301),
            parent_kind: CommentableKind::Review,
            parent_id: EntityId::new(44),
            reply_to: None,
            body: "Great review".into(),
            status,
            author: Some(author()),
            created_at: Timestamp::from_millis(0),
        })
    };

    assert!(route(&Transition::created(comment(ModerationStatus::Pending))).is_empty());

    let events = route(&Transition::updated(
        comment(ModerationStatus::Pending),
        comment(ModerationStatus::Approved),
    ));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel.name(), "comments.reviews.44");
    assert_eq!(events[0].payload["commentable_type"], json!("reviews"));
    assert_eq!(events[0].payload["commentable_id"], json!(44));
}

#[test]
fn test_every_publish_excludes_the_originating_connection() {
    let origin = ConnectionId::new();
    let message = Entity::Message(EditorialMessage {
        id: EntityId::new(9),
        sender: Some(author()),
        recipients: vec![UserId::new(1), UserId::new(2)],
        group: None,
        subject: None,
        body: "Deadline moved".into(),
        created_at: Timestamp::from_millis(0),
        read_at: None,
    });
    let actor = Actor::user(UserId::new(12)).on_connection(origin);

    let events = route(&Transition::created(message).by(actor));
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.exclude == Some(origin)));
    let channels: Vec<String> = events.iter().map(|event| event.channel.name()).collect();
    assert_eq!(channels, vec!["editorial.user.1", "editorial.user.2"]);
}

#[test]
fn test_notifications_go_to_the_recipient_only() {
    let notification = Entity::Notification(NotificationRecord {
        id: EntityId::new(600),
        recipient_id: UserId::new(31),
        notification_type: "friend_request".into(),
        message: "Linus wants to be friends".into(),
        link: Some("/friends".into()),
        data: None,
        timestamp: Timestamp::from_millis(1_700_000_000_000),
    });

    let events = route(&Transition::created(notification));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].channel.name(), "user.31");
    assert_eq!(events[0].payload["type"], json!("friend_request"));
    assert_eq!(events[0].payload["timestamp"], json!("2023-11-14T22:13:20Z"));
}
