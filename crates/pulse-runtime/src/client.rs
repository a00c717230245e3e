//! Client session
//!
//! Binds a [`ChannelSubscriber`] to a broker connection and to the REST
//! catch-up source. Mounting connects, subscribes every channel of the spec
//! and hydrates from a fetch; reconnecting repeats the fetch, which is the
//! recovery path for anything missed while disconnected.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use pulse_core::{
    ChannelSubscriber, ConnectionId, FeatureArea, Identified, MergeOutcome, Result,
    SubscriberConfig, SubscriberError, SubscriptionSpec, UserId,
};

use crate::broker::{Delivery, DeliveryReceiver, MemoryBroker};

// ----------------------------------------------------------------------------
// Catch-up Source
// ----------------------------------------------------------------------------

/// The REST companion that returns current state for a subscription
#[async_trait]
pub trait CatchUpSource<T>: Send + Sync {
    /// Items in display order for the given subscription
    async fn fetch(&self, spec: &SubscriptionSpec) -> Result<Vec<T>>;
}

/// Tally of one non-blocking drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub inserted: usize,
    pub replaced: usize,
    pub duplicates: usize,
    /// Deliveries the subscriber rejected (unknown event, undecodable payload)
    pub rejected: usize,
}

impl DrainReport {
    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Replaced => self.replaced += 1,
            MergeOutcome::Duplicate => self.duplicates += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.inserted + self.replaced + self.duplicates + self.rejected
    }
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

pub struct ClientSession<T> {
    broker: MemoryBroker,
    user_id: Option<UserId>,
    source: Arc<dyn CatchUpSource<T>>,
    subscriber: ChannelSubscriber<T>,
    connection: Option<(ConnectionId, DeliveryReceiver)>,
}

impl<T> ClientSession<T>
where
    T: Identified + DeserializeOwned,
{
    /// Connect, subscribe and hydrate
    pub async fn mount(
        broker: MemoryBroker,
        user_id: Option<UserId>,
        spec: SubscriptionSpec,
        source: Arc<dyn CatchUpSource<T>>,
    ) -> Result<Self> {
        let mut session = Self {
            broker,
            user_id,
            source,
            subscriber: ChannelSubscriber::new(spec),
            connection: None,
        };
        session.connect()?;
        session.refresh().await;
        info!(
            channels = session.subscriber.channels().len(),
            items = session.subscriber.len(),
            "Client session mounted"
        );
        Ok(session)
    }

    /// Mount a feature-area preset; private features connect as their owner
    pub async fn mount_feature(
        broker: MemoryBroker,
        area: &FeatureArea,
        config: &SubscriberConfig,
        source: Arc<dyn CatchUpSource<T>>,
    ) -> Result<Self> {
        let spec = area.spec(config)?;
        Self::mount(broker, area.owner(), spec, source).await
    }

    fn connect(&mut self) -> Result<()> {
        let (connection_id, receiver) = self.broker.connect(self.user_id);
        for channel in self.subscriber.channels() {
            if let Err(e) = self.broker.subscribe(connection_id, channel.clone()) {
                self.broker.disconnect(connection_id);
                return Err(e.into());
            }
        }
        self.connection = Some((connection_id, receiver));
        Ok(())
    }

    /// Re-fetch current state; a failed fetch keeps the list as it is
    async fn refresh(&mut self) {
        match self.source.fetch(self.subscriber.spec()).await {
            Ok(items) => self.subscriber.hydrate(items),
            Err(e) => warn!("Catch-up fetch failed, keeping current list: {}", e),
        }
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.connection.as_ref().map(|(connection_id, _)| *connection_id)
    }

    pub fn subscriber(&self) -> &ChannelSubscriber<T> {
        &self.subscriber
    }

    pub fn items(&self) -> impl Iterator<Item = &T> + '_ {
        self.subscriber.items()
    }

    pub fn unseen_count(&self) -> usize {
        self.subscriber.unseen_count()
    }

    pub fn reset_unseen(&mut self) {
        self.subscriber.reset_unseen();
    }

    fn merge(&mut self, delivery: Delivery) -> std::result::Result<MergeOutcome, SubscriberError> {
        self.subscriber
            .apply(&delivery.channel, delivery.event, &delivery.payload)
            .inspect_err(|e| debug!(channel = %delivery.channel, "Delivery rejected: {}", e))
    }

    /// Merge everything already delivered without waiting
    pub fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        let mut pending = Vec::new();
        if let Some((_, receiver)) = self.connection.as_mut() {
            while let Ok(delivery) = receiver.try_recv() {
                pending.push(delivery);
            }
        }
        for delivery in pending {
            match self.merge(delivery) {
                Ok(outcome) => report.record(outcome),
                Err(_) => report.rejected += 1,
            }
        }
        report
    }

    /// Wait for the next delivery the subscriber accepts.
    ///
    /// Returns `None` once the session is torn down or its connection closed.
    pub async fn recv_and_merge(&mut self) -> Option<MergeOutcome> {
        loop {
            let delivery = {
                let (_, receiver) = self.connection.as_mut()?;
                receiver.recv().await?
            };
            if let Ok(outcome) = self.merge(delivery) {
                return Some(outcome);
            }
        }
    }

    /// Drop the connection, open a fresh one and re-hydrate
    pub async fn reconnect(&mut self) -> Result<()> {
        if !self.subscriber.is_active() {
            return Err(SubscriberError::TornDown.into());
        }
        if let Some((connection_id, _)) = self.connection.take() {
            self.broker.disconnect(connection_id);
        }
        self.connect()?;
        self.refresh().await;
        debug!(items = self.subscriber.len(), "Client session reconnected");
        Ok(())
    }

    /// Stop listening and release the connection
    pub fn teardown(&mut self) {
        self.subscriber.teardown();
        if let Some((connection_id, _)) = self.connection.take() {
            self.broker.disconnect(connection_id);
        }
    }
}

impl<T> Drop for ClientSession<T> {
    fn drop(&mut self) {
        if let Some((connection_id, _)) = self.connection.take() {
            self.broker.disconnect(connection_id);
        }
    }
}
