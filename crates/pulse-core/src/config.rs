//! Centralized Configuration Management
//!
//! Every tunable of the fabric lives here so hosts can load one document
//! (TOML in the CLI) and hand the relevant section to each component.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{PulseError, Result};
use crate::payload::DEFAULT_EXCERPT_LENGTH;

// ----------------------------------------------------------------------------
// Dispatch Configuration
// ----------------------------------------------------------------------------

/// Queueing and retry behaviour of the asynchronous dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Capacity of the bounded publish queue; a full queue drops events
    pub queue_capacity: usize,
    /// Attempts per event, the first one included
    pub max_attempts: u32,
    /// Upper bound on a single publish attempt
    pub publish_timeout_ms: u64,
    /// Delay before the second attempt
    pub initial_retry_delay_ms: u64,
    /// Cap for the exponential backoff
    pub max_retry_delay_ms: u64,
    /// Exponential backoff multiplier
    pub backoff_multiplier: f32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_attempts: 3,
            publish_timeout_ms: 2_000,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl DispatchConfig {
    /// Deep queue and quick retries for busy hosts
    pub fn high_throughput() -> Self {
        Self {
            queue_capacity: 8192,
            max_attempts: 5,
            publish_timeout_ms: 1_000,
            initial_retry_delay_ms: 50,
            max_retry_delay_ms: 1_000,
            backoff_multiplier: 1.5,
        }
    }

    /// Fewer, slower retries so a struggling broker is not hammered
    pub fn conservative() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 2,
            publish_timeout_ms: 5_000,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 5_000,
            backoff_multiplier: 3.0,
        }
    }

    /// Create configuration optimized for testing (fast retries)
    pub fn testing() -> Self {
        Self {
            queue_capacity: 64,
            max_attempts: 3,
            publish_timeout_ms: 200,
            initial_retry_delay_ms: 5,
            max_retry_delay_ms: 20,
            backoff_multiplier: 2.0,
        }
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` starts at 1
    pub fn next_retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        let delay = self.initial_retry_delay_ms as f64 * (self.backoff_multiplier as f64).powi(exponent);
        let capped = delay.min(self.max_retry_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }
}

// ----------------------------------------------------------------------------
// Progress Configuration
// ----------------------------------------------------------------------------

/// Per-activity deltas applied by the progress engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub post_xp_delta: u64,
    pub post_reputation_delta: u64,
    pub thread_xp_delta: u64,
    pub review_xp_delta: u64,
    /// Bound on XP-reward cascade rounds during one evaluation
    pub max_cascade_rounds: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            post_xp_delta: 10,
            post_reputation_delta: 5,
            thread_xp_delta: 20,
            review_xp_delta: 50,
            max_cascade_rounds: 16,
        }
    }
}

// ----------------------------------------------------------------------------
// Subscriber Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriberConfig {
    /// Longest list a subscriber keeps; older entries fall off the far end
    pub max_items: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self { max_items: 100 }
    }
}

// ----------------------------------------------------------------------------
// Contract Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Excerpt length in characters
    pub excerpt_length: usize,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            excerpt_length: DEFAULT_EXCERPT_LENGTH,
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration struct that consolidates all fabric configurations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub dispatch: DispatchConfig,
    pub progress: ProgressConfig,
    pub subscriber: SubscriberConfig,
    pub contract: ContractConfig,
}

impl PulseConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn high_throughput() -> Self {
        Self {
            dispatch: DispatchConfig::high_throughput(),
            subscriber: SubscriberConfig { max_items: 250 },
            ..Self::default()
        }
    }

    pub fn conservative() -> Self {
        Self {
            dispatch: DispatchConfig::conservative(),
            ..Self::default()
        }
    }

    pub fn testing() -> Self {
        Self {
            dispatch: DispatchConfig::testing(),
            subscriber: SubscriberConfig { max_items: 20 },
            ..Self::default()
        }
    }

    /// Look up a preset by the name used on the command line
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "high-throughput" => Some(Self::high_throughput()),
            "conservative" => Some(Self::conservative()),
            "testing" => Some(Self::testing()),
            _ => None,
        }
    }

    pub fn with_dispatch(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_subscriber(mut self, subscriber: SubscriberConfig) -> Self {
        self.subscriber = subscriber;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<()> {
        let dispatch = &self.dispatch;
        if dispatch.queue_capacity == 0 {
            return Err(PulseError::config_error("Dispatch queue capacity cannot be zero"));
        }
        if dispatch.max_attempts == 0 {
            return Err(PulseError::config_error("Max attempts cannot be zero"));
        }
        if dispatch.publish_timeout_ms == 0 {
            return Err(PulseError::config_error("Publish timeout cannot be zero"));
        }
        if dispatch.backoff_multiplier < 1.0 {
            return Err(PulseError::config_error(
                "Backoff multiplier must be at least 1.0",
            ));
        }
        if dispatch.initial_retry_delay_ms > dispatch.max_retry_delay_ms {
            return Err(PulseError::config_error(
                "Initial retry delay cannot be greater than max retry delay",
            ));
        }

        if self.progress.max_cascade_rounds == 0 {
            return Err(PulseError::config_error("Cascade rounds cannot be zero"));
        }
        if self.subscriber.max_items == 0 {
            return Err(PulseError::config_error("Subscriber max items cannot be zero"));
        }
        if self.contract.excerpt_length == 0 {
            return Err(PulseError::config_error("Excerpt length cannot be zero"));
        }
        Ok(())
    }
}
