//! Periodic reconciliation loop

use crate::reconciler::Reconcile;
use crate::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Drives a reconciler: one cycle right away, then one per interval.
///
/// Cycles never overlap and a running cycle is never interrupted; shutdown
/// is only observed while waiting. The first failing cycle ends the loop.
pub struct Scheduler<R> {
    reconciler: R,
    interval: Duration,
    shutdown: CancellationToken,
}

impl<R: Reconcile> Scheduler<R> {
    pub fn new(reconciler: R, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            reconciler,
            interval,
            shutdown,
        }
    }

    /// Run until shutdown is requested or a cycle fails
    pub async fn run(&self) -> Result<()> {
        loop {
            if let Err(e) = self.reconciler.reconcile().await {
                debug!("Reconciliation cycle failed, stopping scheduler");
                return Err(e);
            }

            info!("Waiting {:?} for next reconciliation", self.interval);
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
