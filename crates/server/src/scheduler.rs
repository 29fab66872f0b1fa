use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bootstrap::EngineService;

/// Periodic escalation ticker, decoupled from request deadlines and from
/// any caller lifecycle. Each tick runs one sweep; a slow sweep skips
/// missed ticks instead of bursting.
pub fn spawn(service: Arc<EngineService>, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            event_name = "escalation.scheduler_started",
            correlation_id = "scheduler",
            interval_secs = interval_secs,
            "escalation scheduler started"
        );

        loop {
            ticker.tick().await;
            let reports = service.run_escalation_sweep(Utc::now());
            if reports.is_empty() {
                debug!(
                    event_name = "escalation.sweep_idle",
                    correlation_id = "scheduler",
                    "escalation sweep found nothing overdue"
                );
            } else {
                info!(
                    event_name = "escalation.sweep_completed",
                    correlation_id = "scheduler",
                    actions = reports.len(),
                    "escalation sweep applied actions"
                );
            }
        }
    })
}
