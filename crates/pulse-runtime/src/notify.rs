//! User notifications
//!
//! A notification is persisted through an optional sink and then pushed on
//! the recipient's private `user.{id}` channel. Persistence is best-effort:
//! a failing sink is logged and the push still goes out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use pulse_core::{
    Actor, Entity, EntityId, NotificationRecord, PulseError, Result, SystemTimeSource,
    TimeSource, Transition, UserId,
};

use crate::fabric::{BroadcastFabric, WriteOutcome};

// ----------------------------------------------------------------------------
// Persistence
// ----------------------------------------------------------------------------

/// Durable storage for notifications (the inbox the REST side reads)
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn persist(&self, record: &NotificationRecord) -> Result<()>;
}

/// Sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemoryNotificationSink {
    records: Mutex<Vec<NotificationRecord>>,
}

impl MemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Records addressed to one user, oldest first
    pub fn inbox(&self, user_id: UserId) -> Vec<NotificationRecord> {
        self.records()
            .into_iter()
            .filter(|record| record.recipient_id == user_id)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for MemoryNotificationSink {
    async fn persist(&self, record: &NotificationRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| PulseError::store_error("notification sink lock poisoned"))?;
        records.push(record.clone());
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

/// What a caller asks to notify; id and timestamp are assigned by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: UserId,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub message: String,
    pub link: Option<String>,
    pub data: Option<Value>,
}

impl Notification {
    pub fn new(
        recipient_id: UserId,
        notification_type: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient_id,
            notification_type: notification_type.into(),
            message: message.into(),
            link: None,
            data: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

// ----------------------------------------------------------------------------
// Service
// ----------------------------------------------------------------------------

/// Persists and pushes notifications
pub struct NotificationService {
    fabric: BroadcastFabric,
    sink: Option<Arc<dyn NotificationSink>>,
    time_source: Arc<dyn TimeSource>,
    next_id: AtomicU64,
}

impl NotificationService {
    pub fn new(fabric: BroadcastFabric) -> Self {
        Self {
            fabric,
            sink: None,
            time_source: Arc::new(SystemTimeSource::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Persist (best-effort) and push one notification
    pub async fn notify(&self, notification: Notification, actor: Actor) -> NotificationRecord {
        let record = NotificationRecord {
            id: EntityId::new(self.next_id.fetch_add(1, Ordering::Relaxed)),
            recipient_id: notification.recipient_id,
            notification_type: notification.notification_type,
            message: notification.message,
            link: notification.link,
            data: notification.data,
            timestamp: self.time_source.now(),
        };

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(&record).await {
                warn!(
                    notification_id = %record.id,
                    recipient_id = %record.recipient_id,
                    "Notification not persisted, pushing anyway: {}",
                    e
                );
            }
        }

        let outcome = self.push(&record, actor);
        debug!(
            notification_id = %record.id,
            recipient_id = %record.recipient_id,
            enqueued = outcome.enqueued,
            "Notification sent"
        );
        record
    }

    /// Send the same notification to several users
    pub async fn notify_many(
        &self,
        recipients: &[UserId],
        notification: Notification,
        actor: Actor,
    ) -> Vec<NotificationRecord> {
        let mut records = Vec::with_capacity(recipients.len());
        for recipient_id in recipients {
            let addressed = Notification {
                recipient_id: *recipient_id,
                ..notification.clone()
            };
            records.push(self.notify(addressed, actor).await);
        }
        records
    }

    fn push(&self, record: &NotificationRecord, actor: Actor) -> WriteOutcome {
        let transition = Transition::created(Entity::Notification(record.clone())).by(actor);
        self.fabric.on_write(&transition)
    }
}
