//! Periodic trigger for lifecycle passes (`watch` mode).

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::lifecycle::{BatchLifecycleManager, PassReport};

pub struct PassDaemon {
    manager: Arc<BatchLifecycleManager>,
    every: Duration,
}

impl PassDaemon {
    #[must_use]
    pub fn new(manager: Arc<BatchLifecycleManager>, every: Duration) -> Self {
        Self { manager, every }
    }

    /// Run a pass immediately and then every interval until `shutdown`
    /// resolves. A pass in progress is finished before returning.
    ///
    /// Returns the number of passes run.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> u64 {
        let mut ticker = interval(self.every.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut passes = 0_u64;
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!(passes, "shutdown requested; stopping lifecycle passes");
                    return passes;
                }
                _ = ticker.tick() => {
                    let report = self.manager.run_once().await;
                    passes += 1;
                    log_pass(passes, &report);
                }
            }
        }
    }
}

fn log_pass(pass: u64, report: &PassReport) {
    match &report.deferred {
        Some(reason) => warn!(pass, reason = %reason, "lifecycle pass deferred"),
        None => info!(
            pass,
            followed_active_job = report.active.is_some(),
            attempted_creation = report.creation.is_some(),
            "lifecycle pass finished"
        ),
    }
}
