//! Pulse Runtime
//!
//! Tokio-based plumbing around `pulse-core`:
//! - `MemoryBroker`: in-memory pub/sub broker with connection-id exclusion
//!   and private-channel authorization
//! - `Dispatcher`: bounded, non-blocking publish queue with timeout and retry
//! - `BroadcastFabric`: the write hook tying detector, contract, progress
//!   engine and dispatcher together
//! - `NotificationService`: persist-then-push user notifications
//! - `ClientSession`: a subscriber bound to a broker connection and a
//!   catch-up source
//! - `FabricBuilder` / `FabricHandle`: assembly and lifecycle

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod broker;
pub mod builder;
pub mod client;
pub mod dispatcher;
pub mod fabric;
pub mod notify;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use broker::{BrokerStats, Delivery, DeliveryReceiver, MemoryBroker, DEFAULT_INBOX_CAPACITY};
pub use builder::{create_test_fabric, FabricBuilder, FabricHandle, FabricStats};
pub use client::{CatchUpSource, ClientSession, DrainReport};
pub use dispatcher::{DispatchSnapshot, DispatchStats, Dispatcher};
pub use fabric::{BroadcastFabric, WriteOutcome};
pub use notify::{MemoryNotificationSink, Notification, NotificationService, NotificationSink};
pub use transport::{BroadcastTransport, PublishReport};

// Re-export core types for convenience
pub use pulse_core::{
    Actor, BroadcastEvent, Channel, ConnectionId, EventName, Payload, PulseConfig, PulseError,
    PulseResult, Transition, TransportError, UserId,
};
