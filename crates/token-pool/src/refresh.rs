//! Scheduler loop
//!
//! Drives the rotator on a fixed interval. Every tick walks the configured
//! regions in order and finishes one region's pass (retries included)
//! before starting the next. State is re-read from the store inside each
//! pass, never carried over from the previous tick.

use std::sync::Arc;
use std::time::Duration;

use common::Region;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::metrics;
use crate::rotator::{PassOutcome, Rotator};

/// Spawn the scheduler loop. The first tick runs immediately so empty
/// pools are bootstrapped at startup.
///
/// Returns a `JoinHandle` for the spawned task; the loop itself never ends.
pub fn spawn_scheduler(
    rotator: Arc<Rotator>,
    regions: Vec<Region>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            regions = regions.len(),
            interval_secs = interval.as_secs(),
            "scheduler started"
        );
        let mut ticker = tokio::time::interval(interval);
        // A slow tick (quota retries) pushes the schedule back instead of bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            run_tick(&rotator, &regions).await;
        }
    })
}

/// Run one pass for every region, sequentially. Errors are logged and
/// contained to their region.
pub async fn run_tick(rotator: &Rotator, regions: &[Region]) {
    for &region in regions {
        match rotator.process_region(region).await {
            Ok(outcome) => {
                metrics::record_pass(region, outcome.label());
                match outcome {
                    PassOutcome::Busy | PassOutcome::Idle => {
                        debug!(%region, outcome = outcome.label(), "region pass");
                    }
                    PassOutcome::Completed {
                        trigger,
                        fetched,
                        promoted,
                        corrective,
                    } => {
                        info!(
                            %region,
                            trigger = trigger.label(),
                            fetched,
                            promoted = ?promoted,
                            corrective = ?corrective,
                            "region pass completed"
                        );
                    }
                }
            }
            Err(e) => {
                metrics::record_pass(region, "error");
                error!(%region, error = %e, "region pass failed");
            }
        }
    }
}
