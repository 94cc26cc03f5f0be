//! Background recovery of stuck upload tasks.
//!
//! Large uploads over unreliable links routinely leave orphaned sessions no
//! human is watching. This sweep runs periodically, force-aborts tasks with
//! no byte progress inside the stuck timeout, and drops finished tasks past
//! their retention grace, reclaiming storage without manual auditing.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::orchestrator::UploadOrchestrator;

/// Stuck-task sweeper service.
pub struct StuckTaskSweeper {
    orchestrator: UploadOrchestrator,
    sweep_interval: Duration,
    enabled: bool,
}

impl StuckTaskSweeper {
    /// Create a new sweeper. Disabled with `ENABLE_STUCK_SWEEP=false`.
    pub fn new(orchestrator: UploadOrchestrator, sweep_interval: Duration) -> Self {
        let enabled = std::env::var("ENABLE_STUCK_SWEEP")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        Self {
            orchestrator,
            sweep_interval,
            enabled,
        }
    }

    /// Run the sweep loop indefinitely; spawn as a background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Stuck-task sweep is disabled");
            return;
        }

        info!("Starting stuck-task sweeper (interval: {:?})", self.sweep_interval);

        let mut ticker = interval(self.sweep_interval);
        loop {
            ticker.tick().await;

            match self.check_once().await {
                Ok((reclaimed, purged)) if reclaimed > 0 || purged > 0 => {
                    info!(
                        "Sweep complete: {} stuck task(s) reclaimed, {} finished task(s) purged",
                        reclaimed, purged
                    );
                }
                Ok(_) => {}
                Err(e) => error!("Stuck-task sweep error: {}", e),
            }
        }
    }

    /// Run a single sweep cycle (for testing or manual invocation).
    pub async fn check_once(&self) -> anyhow::Result<(usize, usize)> {
        let reclaimed = self.orchestrator.clear_stuck_tasks().await;
        let purged = self.orchestrator.purge_finished().await;
        Ok((reclaimed, purged))
    }
}
