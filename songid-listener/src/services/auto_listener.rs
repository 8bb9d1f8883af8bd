//! Periodic re-identification
//!
//! Fires [`IdentificationOrchestrator::trigger`] on a fixed interval. Ticks
//! that land while an attempt is in flight or listening is disabled are
//! dropped by the orchestrator's entry guard.

use super::orchestrator::{IdentificationOrchestrator, TriggerRejection};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct AutoListener {
    orchestrator: Arc<IdentificationOrchestrator>,
    interval: Duration,
}

impl AutoListener {
    pub fn new(orchestrator: Arc<IdentificationOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Run until cancelled or the orchestrator shuts down
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(interval_secs = self.interval.as_secs(), "Auto listener started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.orchestrator.trigger() {
                            Ok(token) => debug!(token = %token, "Auto listener triggered identification"),
                            Err(TriggerRejection::ShutDown) => break,
                            Err(rejection) => debug!(%rejection, "Auto listener tick skipped"),
                        }
                    }
                }
            }

            info!("Auto listener stopped");
        })
    }
}
