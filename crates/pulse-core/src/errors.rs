//! Error types for the Pulse broadcast fabric
//!
//! This module contains all error types used throughout the core crate:
//! contract (channel resolution and payload shaping) errors, transport errors,
//! progress-state errors, subscriber errors, and the `PulseError` type that
//! unifies them all.

use crate::types::{ConnectionId, EntityId, UserId};

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Errors raised while resolving channels or shaping payloads
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("Entity {entity_id} of kind {kind} resolves to no channel")]
    NoChannel { kind: String, entity_id: EntityId },
    #[error("Invalid channel name: {name}")]
    InvalidChannelName { name: String },
    #[error("No contract registered for entity kind {kind}")]
    UnregisteredKind { kind: String },
    #[error("Payload shaping failed for entity {entity_id}: {reason}")]
    PayloadShaping { entity_id: EntityId, reason: String },
}

/// Errors raised at the broadcast transport boundary
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Broker unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("Publish to {channel} timed out after {duration_ms}ms")]
    Timeout { channel: String, duration_ms: u64 },
    #[error("Connection not found: {connection_id}")]
    ConnectionNotFound { connection_id: ConnectionId },
    #[error("Connection {connection_id} is not authorized to subscribe to {channel}")]
    Unauthorized {
        connection_id: ConnectionId,
        channel: String,
    },
    #[error("Dispatch queue full (capacity: {capacity})")]
    QueueFull { capacity: usize },
    #[error("Transport shutdown: {reason}")]
    Shutdown { reason: String },
}

/// Errors raised by the progress-state engine and its store
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("Unknown user {user_id}")]
    UnknownUser { user_id: UserId },
    #[error("Progress store failure: {reason}")]
    Store { reason: String },
    #[error("Rank ladder is invalid: {reason}")]
    InvalidLadder { reason: String },
}

/// Errors raised by the client-side subscriber
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Event {event} is not handled by this subscriber")]
    UnhandledEvent { event: String },
    #[error("Channel {channel} is not subscribed by this subscriber")]
    UnsubscribedChannel { channel: String },
    #[error("Payload could not be decoded: {reason}")]
    Decode { reason: String },
    #[error("Subscriber already torn down")]
    TornDown,
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for the Pulse fabric
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    #[error("Subscriber error: {0}")]
    Subscriber(#[from] SubscriberError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl PulseError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        PulseError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a broker-unavailable transport error
    pub fn unavailable<T: Into<String>>(reason: T) -> Self {
        PulseError::Transport(TransportError::Unavailable {
            reason: reason.into(),
        })
    }

    /// Create a progress store error
    pub fn store_error<T: Into<String>>(reason: T) -> Self {
        PulseError::Progress(ProgressError::Store {
            reason: reason.into(),
        })
    }

    /// Whether retrying the same operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PulseError::Transport(TransportError::Unavailable { .. })
                | PulseError::Transport(TransportError::Timeout { .. })
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, PulseError>;
pub type PulseResult<T> = Result<T>;
