//! Broadcast transport abstraction
//!
//! The fabric needs exactly one thing from a broker: publish an event to
//! whoever is currently subscribed to its channel, skipping the excluded
//! connection. Delivery is at-most-once, unordered across channels and not
//! persisted; retries are the dispatcher's business, never the transport's.

use async_trait::async_trait;
use serde::Serialize;

use pulse_core::{BroadcastEvent, TransportError};

/// What a single publish reached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Connections the event was handed to
    pub delivered: usize,
    /// Subscribers skipped because they originated the write
    pub excluded: usize,
    /// Subscribers whose inbox was full or closed
    pub dropped: usize,
}

/// Unified broker interface for the fabric
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    /// Publish one event to the subscribers of its channel
    async fn publish(&self, event: &BroadcastEvent) -> Result<PublishReport, TransportError>;

    /// Short identifier used in logs
    fn name(&self) -> &'static str;
}
