//! Write-hook orchestration
//!
//! [`BroadcastFabric::on_write`] is called once per successful write. It
//! feeds the transition to the progress engine, asks the detector whether the
//! write is publish-worthy, routes the detection through the channel
//! contract and queues the resulting events. Nothing here blocks on the
//! broker, and no failure is ever surfaced to the write.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use pulse_core::{
    trigger_for, ChannelContract, Detection, EventName, ProgressEngine, ProgressReport,
    Transition, TransitionDetector,
};

use crate::dispatcher::{DispatchSnapshot, Dispatcher};

/// What one write produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WriteOutcome {
    /// Event fired by the detector, if the write was publish-worthy
    pub detected: Option<EventName>,
    /// Events accepted by the dispatch queue
    pub enqueued: usize,
    /// Events lost to routing failures or a full queue
    pub dropped: usize,
    pub progress: Option<ProgressReport>,
}

impl WriteOutcome {
    pub fn is_broadcast(&self) -> bool {
        self.enqueued > 0
    }
}

/// Cheaply cloneable write hook shared by every writer
#[derive(Clone)]
pub struct BroadcastFabric {
    detector: Arc<dyn TransitionDetector>,
    contract: Arc<ChannelContract>,
    dispatcher: Dispatcher,
    progress: Option<Arc<ProgressEngine>>,
}

impl BroadcastFabric {
    pub fn new(
        detector: Arc<dyn TransitionDetector>,
        contract: Arc<ChannelContract>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            detector,
            contract,
            dispatcher,
            progress: None,
        }
    }

    /// Also feed every transition to the progress-state engine
    pub fn with_progress(mut self, engine: Arc<ProgressEngine>) -> Self {
        self.progress = Some(engine);
        self
    }

    pub fn contract(&self) -> &ChannelContract {
        &self.contract
    }

    pub fn progress(&self) -> Option<&Arc<ProgressEngine>> {
        self.progress.as_ref()
    }

    pub fn dispatch_stats(&self) -> DispatchSnapshot {
        self.dispatcher.stats()
    }

    /// Handle one committed write
    pub fn on_write(&self, transition: &Transition) -> WriteOutcome {
        let mut outcome = WriteOutcome {
            progress: self.apply_progress(transition),
            ..WriteOutcome::default()
        };

        let Some(detection) = self.detector.detect(transition) else {
            return outcome;
        };
        outcome.detected = Some(detection.event);
        self.broadcast(&detection, &mut outcome);
        outcome
    }

    /// Publish a detection directly, bypassing the detector
    pub fn publish(&self, detection: &Detection) -> WriteOutcome {
        let mut outcome = WriteOutcome {
            detected: Some(detection.event),
            ..WriteOutcome::default()
        };
        self.broadcast(detection, &mut outcome);
        outcome
    }

    fn apply_progress(&self, transition: &Transition) -> Option<ProgressReport> {
        let engine = self.progress.as_ref()?;
        let trigger = trigger_for(transition)?;
        match engine.apply(trigger) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(?trigger, "Progress update failed: {}", e);
                None
            }
        }
    }

    fn broadcast(&self, detection: &Detection, outcome: &mut WriteOutcome) {
        let events = match self.contract.route(detection) {
            Ok(events) => events,
            Err(e) => {
                warn!(
                    event = %detection.event,
                    entity_id = %detection.entity.id(),
                    "Detected but not broadcast: {}",
                    e
                );
                outcome.dropped += 1;
                return;
            }
        };

        for event in events {
            let channel = event.channel.clone();
            match self.dispatcher.enqueue(event) {
                Ok(()) => {
                    debug!(channel = %channel, event = %detection.event, "Event queued");
                    outcome.enqueued += 1;
                }
                Err(e) => {
                    warn!(channel = %channel, "Event not queued: {}", e);
                    outcome.dropped += 1;
                }
            }
        }
    }
}

impl std::fmt::Debug for BroadcastFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastFabric")
            .field("dispatcher", &self.dispatcher)
            .field("progress", &self.progress.is_some())
            .finish_non_exhaustive()
    }
}
