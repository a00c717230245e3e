//! Fabric Builder API
//!
//! Provides a builder-style API for hosts (CLI, tests, an application server)
//! to pick a transport, attach the progress engine and notification sink, and
//! get back a running handle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, Level};

use pulse_core::{
    ChannelContract, DefaultDetector, MemoryProgressStore, ProgressEngine, ProgressStore,
    PulseConfig, Result, SystemTimeSource, TimeSource, Transition, TransitionDetector,
};

use crate::broker::{BrokerStats, MemoryBroker};
use crate::dispatcher::{DispatchSnapshot, Dispatcher};
use crate::fabric::{BroadcastFabric, WriteOutcome};
use crate::notify::{NotificationService, NotificationSink};
use crate::transport::BroadcastTransport;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Fabric Builder
// ----------------------------------------------------------------------------

/// Builder for a running broadcast fabric
pub struct FabricBuilder {
    config: PulseConfig,
    transport: Option<Arc<dyn BroadcastTransport>>,
    broker: Option<MemoryBroker>,
    detector: Arc<dyn TransitionDetector>,
    progress_store: Option<Arc<dyn ProgressStore>>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
    time_source: Arc<dyn TimeSource>,
    log_level: Option<Level>,
}

impl Default for FabricBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FabricBuilder {
    pub fn new() -> Self {
        Self {
            config: PulseConfig::default(),
            transport: None,
            broker: None,
            detector: Arc::new(DefaultDetector::new()),
            progress_store: None,
            notification_sink: None,
            time_source: Arc::new(SystemTimeSource::new()),
            log_level: None,
        }
    }

    /// Set the fabric configuration
    pub fn with_config(mut self, config: PulseConfig) -> Self {
        self.config = config;
        self
    }

    /// Publish through an external broker
    pub fn with_transport(mut self, transport: Arc<dyn BroadcastTransport>) -> Self {
        self.transport = Some(transport);
        self.broker = None;
        self
    }

    /// Publish through a shared in-memory broker the caller also subscribes to
    pub fn with_broker(mut self, broker: MemoryBroker) -> Self {
        self.transport = Some(Arc::new(broker.clone()));
        self.broker = Some(broker);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn TransitionDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Run the progress-state engine on every write
    pub fn with_progress_store(mut self, store: Arc<dyn ProgressStore>) -> Self {
        self.progress_store = Some(store);
        self
    }

    /// Run the progress-state engine over a fresh in-memory store
    pub fn with_memory_progress(self) -> Self {
        self.with_progress_store(Arc::new(MemoryProgressStore::new()))
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn with_time_source(mut self, time_source: Arc<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    /// Report startup and shutdown at the given level
    pub fn with_console_logging(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Disable logging
    pub fn with_no_logging(mut self) -> Self {
        self.log_level = None;
        self
    }

    /// Build and start the fabric
    pub async fn build_and_start(self) -> Result<FabricHandle> {
        self.config.validate()?;
        let logging = self.log_level.is_some();

        let (transport, broker) = match (self.transport, self.broker) {
            (Some(transport), broker) => (transport, broker),
            (None, _) => {
                let broker = MemoryBroker::new();
                let transport: Arc<dyn BroadcastTransport> = Arc::new(broker.clone());
                (transport, Some(broker))
            }
        };
        let transport_name = transport.name();

        let contract = Arc::new(ChannelContract::new(&self.config.contract));
        let (dispatcher, dispatch_handle) =
            Dispatcher::spawn(transport, self.config.dispatch.clone());

        let mut fabric = BroadcastFabric::new(self.detector, contract, dispatcher.clone());
        let progress = self.progress_store.map(|store| {
            Arc::new(
                ProgressEngine::new(store, self.config.progress.clone())
                    .with_time_source(self.time_source.clone()),
            )
        });
        if let Some(engine) = &progress {
            fabric = fabric.with_progress(engine.clone());
        }

        let mut notifications =
            NotificationService::new(fabric.clone()).with_time_source(self.time_source);
        if let Some(sink) = self.notification_sink {
            notifications = notifications.with_sink(sink);
        }

        if logging {
            info!(
                transport = transport_name,
                queue_capacity = self.config.dispatch.queue_capacity,
                progress = progress.is_some(),
                "Pulse fabric started"
            );
        }

        Ok(FabricHandle {
            config: self.config,
            fabric,
            dispatcher,
            dispatch_handle: Some(dispatch_handle),
            broker,
            progress,
            notifications: Arc::new(notifications),
            logging,
        })
    }
}

// ----------------------------------------------------------------------------
// Fabric Handle
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FabricStats {
    pub dispatch: DispatchSnapshot,
    pub broker: Option<BrokerStats>,
}

/// Handle to a running fabric instance
pub struct FabricHandle {
    config: PulseConfig,
    fabric: BroadcastFabric,
    dispatcher: Dispatcher,
    dispatch_handle: Option<JoinHandle<()>>,
    broker: Option<MemoryBroker>,
    progress: Option<Arc<ProgressEngine>>,
    notifications: Arc<NotificationService>,
    logging: bool,
}

impl FabricHandle {
    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Write hook to hand to every writer
    pub fn fabric(&self) -> BroadcastFabric {
        self.fabric.clone()
    }

    /// The in-memory broker, when the fabric publishes through one
    pub fn broker(&self) -> Option<&MemoryBroker> {
        self.broker.as_ref()
    }

    pub fn progress(&self) -> Option<&Arc<ProgressEngine>> {
        self.progress.as_ref()
    }

    pub fn notifications(&self) -> Arc<NotificationService> {
        self.notifications.clone()
    }

    pub fn on_write(&self, transition: &Transition) -> WriteOutcome {
        self.fabric.on_write(transition)
    }

    pub fn stats(&self) -> FabricStats {
        FabricStats {
            dispatch: self.dispatcher.stats(),
            broker: self.broker.as_ref().map(MemoryBroker::stats),
        }
    }

    /// Check if the dispatch task is still running
    pub fn is_running(&self) -> bool {
        self.dispatch_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait until every queued event was published or abandoned.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn settle(&self, timeout: Duration) -> bool {
        let poll = async {
            while self.dispatcher.stats().in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.is_ok()
    }

    /// Publish what is queued, then stop the dispatcher
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.logging {
            info!("Shutting down Pulse fabric");
        }

        self.dispatcher.shutdown();
        if let Some(handle) = self.dispatch_handle.take() {
            let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await;
        }

        if self.logging {
            let stats = self.dispatcher.stats();
            info!(
                published = stats.published,
                failed = stats.failed,
                dropped = stats.dropped,
                "Pulse fabric shut down"
            );
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Convenience Functions
// ----------------------------------------------------------------------------

/// Fabric over a fresh in-memory broker and progress store, tuned for tests
pub async fn create_test_fabric() -> Result<FabricHandle> {
    FabricBuilder::new()
        .with_config(PulseConfig::testing())
        .with_broker(MemoryBroker::new())
        .with_memory_progress()
        .with_no_logging()
        .build_and_start()
        .await
}
