//! # Escalation Sweeper
//!
//! Background task that periodically runs the gateway's escalation sweep,
//! resolving pending commands whose escalation deadline has passed.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use cmdgw_engine::CommandGateway;

/// Spawn the periodic escalation sweep.
///
/// Each tick processes every due command once. The sweep is idempotent,
/// so overlapping deployments running their own sweepers stay correct.
pub fn spawn_escalation_sweeper(gateway: CommandGateway, interval_secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // The first tick fires immediately; skip it so startup is quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let processed = gateway.process_escalations(Utc::now());
            if processed > 0 {
                tracing::info!(processed, "escalation sweep resolved pending commands");
            }
        }
    })
}
