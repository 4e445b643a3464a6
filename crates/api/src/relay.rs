//! Periodic drain of the stock adjustment outbox.

use std::sync::Arc;
use std::time::Duration;

use common::Deadline;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::Fulfillment;

/// Retries pending stock adjustments every `every`, giving each pass
/// `budget` to finish.
pub fn spawn_outbox_relay(
    coordinator: Arc<Fulfillment>,
    every: Duration,
    budget: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match coordinator
                .retry_pending_adjustments(Deadline::after(budget))
                .await
            {
                Ok(report) if report.attempted > 0 => {
                    tracing::info!(
                        attempted = report.attempted,
                        applied = report.applied,
                        failed = report.failed,
                        abandoned = report.abandoned,
                        "outbox relay pass"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "outbox relay pass failed"),
            }
        }
    })
}
