//! Example scenarios run end-to-end against the in-memory broker
//!
//! Every scenario builds its own fabric, performs a short sequence of writes
//! and checks what subscribers and the progress store ended up with.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use pulse_core::{
    Actor, Channel, Comment, CommentableKind, ContentItem, ContentKind, Entity, EntityId,
    EventName, FeatureArea, FeedEntry, ForumPost, ModerationStatus, Payload, Product,
    PublishStatus, PulseConfig, SubscriptionSpec, Timestamp, Transition, UserId, UserRecord,
};
use pulse_runtime::{
    CatchUpSource, ClientSession, Delivery, DeliveryReceiver, FabricBuilder, FabricHandle,
    MemoryBroker,
};

use crate::cli::Scenario;
use crate::error::{CliError, Result};

const SETTLE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub scenario: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Run one scenario; a failed check is reported, not raised
pub async fn run(scenario: Scenario, config: &PulseConfig) -> ScenarioReport {
    info!(scenario = scenario.name(), "Running scenario");
    let result = match scenario {
        Scenario::PublishOnce => publish_once(config).await,
        Scenario::EchoExclusion => echo_exclusion(config).await,
        Scenario::Milestones => milestones(config).await,
        Scenario::IdempotentUnlock => idempotent_unlock(config).await,
        Scenario::RankFollowsReputation => rank_follows_reputation(config).await,
        Scenario::StockUpdate => stock_update(config).await,
        Scenario::CommentModeration => comment_moderation(config).await,
        Scenario::HydrateDedup => hydrate_dedup(config).await,
    };

    match result {
        Ok(detail) => ScenarioReport {
            scenario: scenario.name(),
            passed: true,
            detail,
        },
        Err(e) => ScenarioReport {
            scenario: scenario.name(),
            passed: false,
            detail: e.to_string(),
        },
    }
}

pub async fn run_all(config: &PulseConfig) -> Vec<ScenarioReport> {
    let mut reports = Vec::with_capacity(Scenario::ALL.len());
    for scenario in Scenario::ALL {
        reports.push(run(scenario, config).await);
    }
    reports
}

// ----------------------------------------------------------------------------
// Harness
// ----------------------------------------------------------------------------

fn ensure(scenario: Scenario, condition: bool, reason: impl Into<String>) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(CliError::ScenarioFailed {
            scenario: scenario.name(),
            reason: reason.into(),
        })
    }
}

async fn start(config: &PulseConfig) -> Result<(FabricHandle, MemoryBroker)> {
    let broker = MemoryBroker::new();
    let handle = FabricBuilder::new()
        .with_config(config.clone())
        .with_broker(broker.clone())
        .with_memory_progress()
        .with_no_logging()
        .build_and_start()
        .await?;
    Ok((handle, broker))
}

fn listen(
    broker: &MemoryBroker,
    user: Option<UserId>,
    channel: Channel,
) -> Result<DeliveryReceiver> {
    let (connection, inbox) = broker.connect(user);
    broker.subscribe(connection, channel)?;
    Ok(inbox)
}

async fn settle(scenario: Scenario, handle: &FabricHandle) -> Result<()> {
    let settled = handle.settle(SETTLE).await;
    ensure(scenario, settled, "dispatch queue did not drain")
}

fn collect(inbox: &mut DeliveryReceiver) -> Vec<Delivery> {
    let mut deliveries = Vec::new();
    while let Ok(delivery) = inbox.try_recv() {
        deliveries.push(delivery);
    }
    deliveries
}

// ----------------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------------

fn member(id: u64) -> UserRecord {
    UserRecord::new(UserId::new(id), format!("member{id}")).with_username(format!("member{id}"))
}

fn guide(status: PublishStatus, body: &str) -> Entity {
    let mut item = ContentItem::new(
        EntityId::new(70),
        ContentKind::Guide,
        "Speedrun Routing 101",
        Timestamp::now(),
    );
    item.status = status;
    item.body = Some(body.to_string());
    item.author = Some(member(12));
    Entity::Content(item)
}

fn article(id: u64) -> Entity {
    let mut item = ContentItem::new(
        EntityId::new(id),
        ContentKind::Article,
        format!("Weekly roundup #{id}"),
        Timestamp::now(),
    );
    item.status = PublishStatus::Published;
    Entity::Content(item)
}

fn reply(id: u64, thread_id: u64, author: u64) -> Entity {
    Entity::Post(ForumPost {
        id: EntityId::new(id),
        thread_id: Some(EntityId::new(thread_id)),
        body: format!("Reply #{id}"),
        author: Some(member(author)),
        created_at: Timestamp::now(),
    })
}

fn product(stock: u32, description: &str) -> Entity {
    Entity::Product(Product {
        id: EntityId::new(5),
        name: "Arcade Stick".into(),
        slug: "arcade-stick".into(),
        description: Some(description.into()),
        stock,
        price_cents: 12_999,
        updated_at: Timestamp::now(),
    })
}

fn comment(status: ModerationStatus) -> Entity {
    Entity::Comment(Comment {
        id: EntityId::new(301),
        parent_kind: CommentableKind::Review,
        parent_id: EntityId::new(44),
        reply_to: None,
        body: "Great review".into(),
        status,
        author: Some(member(12)),
        created_at: Timestamp::now(),
    })
}

/// Catch-up source returning a fixed list
struct StaticCatchUp(Vec<FeedEntry>);

#[async_trait]
impl CatchUpSource<FeedEntry> for StaticCatchUp {
    async fn fetch(&self, _spec: &SubscriptionSpec) -> pulse_core::Result<Vec<FeedEntry>> {
        Ok(self.0.clone())
    }
}

// ----------------------------------------------------------------------------
// Scenarios
// ----------------------------------------------------------------------------

async fn publish_once(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::PublishOnce;
    let (mut handle, broker) = start(config).await?;
    let mut inbox = listen(&broker, None, Channel::Guides)?;

    let draft = guide(PublishStatus::Draft, "Route notes");
    let published = guide(PublishStatus::Published, "Route notes");
    let edited = guide(PublishStatus::Published, "Route notes, revised");
    let detected = [
        handle.on_write(&Transition::created(draft.clone())),
        handle.on_write(&Transition::updated(draft, published.clone())),
        handle.on_write(&Transition::updated(published, edited)),
    ]
    .map(|outcome| outcome.detected.is_some());
    settle(scenario, &handle).await?;

    let deliveries = collect(&mut inbox);
    handle.shutdown().await?;
    ensure(
        scenario,
        detected == [false, true, false],
        format!("detections per write were {detected:?}"),
    )?;
    ensure(
        scenario,
        deliveries.len() == 1 && deliveries[0].event == EventName::GuidePublished,
        format!("expected one guide.published, got {}", deliveries.len()),
    )?;
    Ok("draft -> published fired once; later edit fired nothing".into())
}

async fn echo_exclusion(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::EchoExclusion;
    let (mut handle, broker) = start(config).await?;
    let thread = Channel::forum_thread(EntityId::new(8));

    let (author, mut author_inbox) = broker.connect(Some(UserId::new(1)));
    broker.subscribe(author, thread.clone())?;
    let mut readers = Vec::new();
    for user in 2..=4 {
        readers.push(listen(&broker, Some(UserId::new(user)), thread.clone())?);
    }

    let actor = Actor::user(UserId::new(1)).on_connection(author);
    handle.on_write(&Transition::created(reply(900, 8, 1)).by(actor));
    settle(scenario, &handle).await?;
    handle.shutdown().await?;

    let echoed = collect(&mut author_inbox).len();
    let received: Vec<usize> = readers.iter_mut().map(|inbox| collect(inbox).len()).collect();
    ensure(scenario, echoed == 0, "author received their own reply")?;
    ensure(
        scenario,
        received.iter().all(|count| *count == 1),
        format!("reader deliveries were {received:?}"),
    )?;
    Ok(format!("{} readers received the reply, author did not", received.len()))
}

async fn milestones(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::Milestones;
    let (mut handle, _broker) = start(config).await?;
    let engine = handle
        .progress()
        .cloned()
        .ok_or_else(|| CliError::Config("progress engine not attached".into()))?;
    let name_of = |id: u64| {
        engine
            .catalog()
            .iter()
            .find(|achievement| achievement.id == id)
            .map(|achievement| achievement.name.clone())
            .unwrap_or_else(|| format!("#{id}"))
    };

    let mut unlocked_at = Vec::new();
    for n in 1..=11u64 {
        let outcome = handle.on_write(&Transition::created(reply(n, 8, 1)));
        let unlocked = outcome.progress.map(|report| report.unlocked).unwrap_or_default();
        debug!(post = n, ?unlocked, "Post recorded");
        unlocked_at.push((n, unlocked));
    }
    handle.shutdown().await?;

    let names = |n: usize| -> Vec<String> {
        unlocked_at[n - 1].1.iter().copied().map(&name_of).collect()
    };
    ensure(
        scenario,
        names(1) == ["First Steps"],
        format!("post 1 unlocked {:?}", names(1)),
    )?;
    ensure(
        scenario,
        names(10) == ["Active Voice"],
        format!("post 10 unlocked {:?}", names(10)),
    )?;
    ensure(
        scenario,
        names(11).is_empty(),
        format!("post 11 unlocked {:?}", names(11)),
    )?;
    Ok("First Steps at #1, Active Voice at #10, nothing at #11".into())
}

async fn idempotent_unlock(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::IdempotentUnlock;
    let (mut handle, _broker) = start(config).await?;
    let engine = handle
        .progress()
        .cloned()
        .ok_or_else(|| CliError::Config("progress engine not attached".into()))?;
    let user_id = UserId::new(1);

    handle.on_write(&Transition::created(reply(1, 8, 1)));
    let xp_before = engine.store().progress(user_id)?.xp;
    let recompute = engine.recompute_all()?;
    let sync = engine.sync_all()?;
    let recompute_again = engine.recompute_all()?;
    handle.shutdown().await?;

    let rows = engine.store().achievements(user_id)?;
    let xp_after = engine.store().progress(user_id)?.xp;
    ensure(scenario, rows.len() == 1, format!("{} unlock rows", rows.len()))?;
    ensure(
        scenario,
        recompute.unlocked + sync.unlocked + recompute_again.unlocked == 0,
        "batch passes unlocked again",
    )?;
    ensure(
        scenario,
        xp_before == xp_after,
        format!("XP moved from {xp_before} to {xp_after}"),
    )?;
    Ok(format!("one unlock row, XP steady at {xp_after}"))
}

async fn rank_follows_reputation(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::RankFollowsReputation;
    let (mut handle, _broker) = start(config).await?;
    let engine = handle
        .progress()
        .cloned()
        .ok_or_else(|| CliError::Config("progress engine not attached".into()))?;
    let user_id = UserId::new(1);

    for id in 1..=10 {
        handle.on_write(&Transition::created(reply(id, 8, 1)));
    }
    let peak = engine.store().progress(user_id)?;
    let mut previous = peak.clone();
    for id in 1..=10 {
        handle.on_write(&Transition::deleted(reply(id, 8, 1)));
        let current = engine.store().progress(user_id)?;
        let threshold = |rank_id: Option<u32>| {
            rank_id
                .and_then(|id| engine.ladder().get(id))
                .map(|rank| rank.min_threshold)
        };
        ensure(
            scenario,
            threshold(current.rank_id) <= threshold(previous.rank_id),
            "rank rose while reputation fell",
        )?;
        ensure(
            scenario,
            current.rank_id == engine.ladder().resolve(current.reputation).map(|rank| rank.id),
            "rank does not match reputation",
        )?;
        previous = current;
    }
    handle.shutdown().await?;

    ensure(scenario, previous.reputation == 0, "reputation not floored at zero")?;
    ensure(scenario, previous.xp == peak.xp, "deleting posts reversed XP")?;
    Ok(format!(
        "reputation {} -> {}, rank {:?} -> {:?}, XP kept at {}",
        peak.reputation, previous.reputation, peak.rank_id, previous.rank_id, previous.xp
    ))
}

async fn stock_update(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::StockUpdate;
    let (mut handle, broker) = start(config).await?;
    let mut inbox = listen(&broker, None, Channel::Shop)?;

    handle.on_write(&Transition::updated(
        product(5, "Tournament grade"),
        product(0, "Tournament grade"),
    ));
    handle.on_write(&Transition::updated(
        product(0, "Tournament grade"),
        product(0, "Sold out"),
    ));
    settle(scenario, &handle).await?;
    handle.shutdown().await?;

    let deliveries = collect(&mut inbox);
    ensure(
        scenario,
        deliveries.len() == 1,
        format!("expected one stock event, got {}", deliveries.len()),
    )?;
    let payload: &Payload = &deliveries[0].payload;
    ensure(
        scenario,
        payload.get("is_available") == Some(&serde_json::Value::Bool(false)),
        "sold-out product still marked available",
    )?;
    Ok("5 -> 0 published is_available=false; description edit published nothing".into())
}

async fn comment_moderation(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::CommentModeration;
    let (mut handle, broker) = start(config).await?;
    let parent = Channel::comments(CommentableKind::Review, EntityId::new(44));
    let mut inbox = listen(&broker, None, parent.clone())?;

    handle.on_write(&Transition::created(comment(ModerationStatus::Pending)));
    settle(scenario, &handle).await?;
    let while_pending = collect(&mut inbox).len();

    handle.on_write(&Transition::updated(
        comment(ModerationStatus::Pending),
        comment(ModerationStatus::Approved),
    ));
    settle(scenario, &handle).await?;
    handle.shutdown().await?;
    let after_approval = collect(&mut inbox);

    ensure(scenario, while_pending == 0, "pending comment was published")?;
    ensure(
        scenario,
        after_approval.len() == 1 && after_approval[0].channel == parent,
        format!("expected one event on {parent}, got {}", after_approval.len()),
    )?;
    Ok(format!("published once on {parent} after approval"))
}

async fn hydrate_dedup(config: &PulseConfig) -> Result<String> {
    let scenario = Scenario::HydrateDedup;
    let (mut handle, broker) = start(config).await?;
    let hydrated = [2u64, 1]
        .into_iter()
        .map(|id| FeedEntry {
            id,
            fields: Payload::new(),
        })
        .collect();

    let mut feed = ClientSession::<FeedEntry>::mount_feature(
        broker,
        &FeatureArea::NewsFeed,
        &config.subscriber,
        Arc::new(StaticCatchUp(hydrated)),
    )
    .await?;

    handle.on_write(&Transition::created(article(2)));
    handle.on_write(&Transition::created(article(3)));
    settle(scenario, &handle).await?;
    let report = feed.drain();
    handle.shutdown().await?;

    let ids: Vec<u64> = feed.items().map(|entry| entry.id).collect();
    feed.teardown();
    ensure(scenario, ids == [3, 2, 1], format!("feed holds {ids:?}"))?;
    ensure(
        scenario,
        report.duplicates == 1 && feed.unseen_count() == 1,
        format!("{report:?}, unseen {}", feed.unseen_count()),
    )?;
    Ok("hydrated id ignored, new id prepended, unseen = 1".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_scenario_passes() {
        let reports = run_all(&PulseConfig::testing()).await;
        assert_eq!(reports.len(), Scenario::ALL.len());
        for report in reports {
            assert!(report.passed, "{}: {}", report.scenario, report.detail);
        }
    }
}
