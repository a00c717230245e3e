//! Asynchronous publish dispatcher
//!
//! The write hook never waits on the broker. It hands each event to a
//! bounded queue with `try_send` and returns; a background task drains the
//! queue and performs every publish under a timeout, retrying transient
//! failures with exponential backoff up to `max_attempts`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use pulse_core::{BroadcastEvent, DispatchConfig, TransportError};

use crate::transport::BroadcastTransport;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Lock-free dispatch counters shared between the handle and the task
#[derive(Debug)]
pub struct DispatchStats {
    pub queue_capacity: usize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    published: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

impl DispatchStats {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            published: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of offered events that never reached the queue
    pub fn drop_rate(&self) -> f32 {
        let enqueued = self.enqueued.load(Ordering::Relaxed);
        let dropped = self.dropped.load(Ordering::Relaxed);
        if enqueued + dropped == 0 {
            0.0
        } else {
            dropped as f32 / (enqueued + dropped) as f32
        }
    }

    pub fn snapshot(&self) -> DispatchSnapshot {
        DispatchSnapshot {
            queue_capacity: self.queue_capacity,
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSnapshot {
    pub queue_capacity: usize,
    pub enqueued: u64,
    pub dropped: u64,
    pub published: u64,
    pub retried: u64,
    pub failed: u64,
}

impl DispatchSnapshot {
    /// Events accepted but not yet published or abandoned
    pub fn in_flight(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.published)
            .saturating_sub(self.failed)
    }
}

// ----------------------------------------------------------------------------
// Dispatcher Handle
// ----------------------------------------------------------------------------

/// Cloneable, non-blocking entry point to the dispatch queue
#[derive(Debug, Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<BroadcastEvent>,
    shutdown: Arc<watch::Sender<bool>>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    /// Start the background task on the current tokio runtime
    pub fn spawn(
        transport: Arc<dyn BroadcastTransport>,
        config: DispatchConfig,
    ) -> (Self, JoinHandle<()>) {
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (shutdown, shutdown_signal) = watch::channel(false);
        let stats = Arc::new(DispatchStats::new(capacity));

        let task = DispatchTask {
            receiver,
            shutdown: shutdown_signal,
            transport,
            config,
            stats: stats.clone(),
        };
        let handle = tokio::spawn(task.run());

        (
            Self {
                sender,
                shutdown: Arc::new(shutdown),
                stats,
            },
            handle,
        )
    }

    /// Queue an event for publishing without waiting.
    ///
    /// A full queue drops the event and reports `QueueFull`; callers log and
    /// move on.
    pub fn enqueue(&self, event: BroadcastEvent) -> Result<(), TransportError> {
        match self.sender.try_send(event) {
            Ok(()) => {
                DispatchStats::record(&self.stats.enqueued);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(event)) => {
                DispatchStats::record(&self.stats.dropped);
                warn!(
                    channel = %event.channel,
                    event = %event.event,
                    capacity = self.stats.queue_capacity,
                    "Dispatch queue full, event dropped"
                );
                Err(TransportError::QueueFull {
                    capacity: self.stats.queue_capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                DispatchStats::record(&self.stats.dropped);
                Err(TransportError::Shutdown {
                    reason: "dispatcher stopped".to_string(),
                })
            }
        }
    }

    pub fn stats(&self) -> DispatchSnapshot {
        self.stats.snapshot()
    }

    pub fn drop_rate(&self) -> f32 {
        self.stats.drop_rate()
    }

    /// Ask the background task to publish what is queued and stop
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ----------------------------------------------------------------------------
// Dispatch Task
// ----------------------------------------------------------------------------

struct DispatchTask {
    receiver: mpsc::Receiver<BroadcastEvent>,
    shutdown: watch::Receiver<bool>,
    transport: Arc<dyn BroadcastTransport>,
    config: DispatchConfig,
    stats: Arc<DispatchStats>,
}

impl DispatchTask {
    async fn run(mut self) {
        info!(transport = self.transport.name(), "Dispatch task starting");

        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        debug!("Shutdown requested, draining dispatch queue");
                        break;
                    }
                }
                next = self.receiver.recv() => match next {
                    Some(event) => self.deliver(event).await,
                    None => {
                        debug!("All dispatcher handles dropped");
                        break;
                    }
                },
            }
        }

        self.receiver.close();
        while let Ok(event) = self.receiver.try_recv() {
            self.deliver(event).await;
        }

        info!("Dispatch task stopped");
    }

    async fn deliver(&self, event: BroadcastEvent) {
        let max_attempts = self.config.max_attempts.max(1);
        let timeout = self.config.publish_timeout();

        for attempt in 1..=max_attempts {
            let outcome = match tokio::time::timeout(timeout, self.transport.publish(&event)).await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout {
                    channel: event.channel.name(),
                    duration_ms: self.config.publish_timeout_ms,
                }),
            };

            match outcome {
                Ok(report) => {
                    DispatchStats::record(&self.stats.published);
                    debug!(
                        channel = %event.channel,
                        event = %event.event,
                        attempt,
                        delivered = report.delivered,
                        "Event published"
                    );
                    return;
                }
                Err(e) if is_retryable(&e) && attempt < max_attempts => {
                    DispatchStats::record(&self.stats.retried);
                    let delay = self.config.next_retry_delay(attempt);
                    warn!(
                        channel = %event.channel,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Publish failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    DispatchStats::record(&self.stats.failed);
                    error!(
                        channel = %event.channel,
                        event = %event.event,
                        attempt,
                        "Publish abandoned: {}",
                        e
                    );
                    return;
                }
            }
        }
    }
}

fn is_retryable(error: &TransportError) -> bool {
    matches!(
        error,
        TransportError::Unavailable { .. } | TransportError::Timeout { .. }
    )
}
