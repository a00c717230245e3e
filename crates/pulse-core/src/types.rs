//! Core types for the Pulse fabric
//!
//! This module defines the fundamental identifiers and time primitives used
//! throughout the fabric, using newtype patterns for type safety.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Domain Identifiers
// ----------------------------------------------------------------------------

/// Stable numeric identifier of a persisted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifier of a platform user (authors, actors, recipients)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = crate::PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| crate::PulseError::config_error(format!("Invalid user id: {s}")))
    }
}

// ----------------------------------------------------------------------------
// Connection Identifier
// ----------------------------------------------------------------------------

/// Identifies one live socket connection at the transport.
///
/// A user may hold several connections at once (tabs, devices); self-exclusion
/// targets the connection that originated the write, not the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh random connection id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// UTC timestamp, serialized as an ISO-8601 / RFC 3339 string
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Build from milliseconds since the Unix epoch, clamping out-of-range values to the epoch
    pub fn from_millis(millis: i64) -> Self {
        Self(
            Utc.timestamp_millis_opt(millis)
                .single()
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        )
    }

    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render in the wire format used by every payload
    pub fn to_iso8601(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

// ----------------------------------------------------------------------------
// Time Source
// ----------------------------------------------------------------------------

/// Abstraction over wall-clock time so unlock stamps and payload times are testable
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Standard library implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

#[cfg(any(test, feature = "testing"))]
mod mock_time {
    use super::{TimeSource, Timestamp};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    /// Mock time source for deterministic testing
    ///
    /// Tests control the flow of time explicitly, so unlock timestamps and
    /// payload times are reproducible.
    #[derive(Debug, Clone, Default)]
    pub struct MockTimeSource {
        current_millis: Arc<AtomicI64>,
    }

    impl MockTimeSource {
        /// Create a new mock time source starting at the epoch
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a new mock time source starting at a specific time
        pub fn new_at(start_millis: i64) -> Self {
            Self {
                current_millis: Arc::new(AtomicI64::new(start_millis)),
            }
        }

        /// Advance time by the specified number of milliseconds
        pub fn advance(&self, millis: i64) {
            self.current_millis.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl TimeSource for MockTimeSource {
        fn now(&self) -> Timestamp {
            Timestamp::from_millis(self.current_millis.load(Ordering::SeqCst))
        }
    }
}

#[cfg(any(test, feature = "testing"))]
pub use mock_time::MockTimeSource;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_iso8601() {
        let ts = Timestamp::from_millis(1_700_000_000_000);
        assert_eq!(ts.to_iso8601(), "2023-11-14T22:13:20Z");
        assert_eq!(
            serde_json::to_value(ts).unwrap(),
            serde_json::json!("2023-11-14T22:13:20Z")
        );
    }

    #[test]
    fn test_mock_time_source_advances() {
        let time = MockTimeSource::new_at(1_000);
        assert_eq!(time.now().as_millis(), 1_000);
        time.advance(500);
        assert_eq!(time.now().as_millis(), 1_500);
    }

    #[test]
    fn test_ids_are_transparent_on_the_wire() {
        assert_eq!(serde_json::to_value(EntityId::new(42)).unwrap(), 42);
        assert_eq!(serde_json::to_value(UserId::new(7)).unwrap(), 7);
        assert_eq!("19".parse::<UserId>().unwrap(), UserId::new(19));
        assert!("nineteen".parse::<UserId>().is_err());
    }
}
