//! Periodic soft garbage collection.
//!
//! Only flips `active` on expired records. Removing inactive records is left to an
//! external batch job.

use std::time::Duration;

use session_store_core::SessionStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Run `gc` every `period`. A zero period disables the sweeper.
pub fn spawn_gc_sweeper(sessions: SessionStore, period: Duration) -> Option<JoinHandle<()>> {
    if period.is_zero() {
        info!("  GC sweeper: disabled");
        return None;
    }
    info!("  GC sweeper: every {:?}", period);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match sessions.gc().await {
                Ok(matched) => debug!("GC sweep matched {} expired session(s)", matched),
                Err(e) => warn!("GC sweep failed: {}", e),
            }
        }
    }))
}
