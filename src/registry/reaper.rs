use super::store::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Periodically finalize sessions whose callers walked away
///
/// Abort the returned handle to stop reaping.
pub fn spawn_reaper(registry: Arc<SessionRegistry>, every: Duration) -> JoinHandle<()> {
    let ttl = registry.policy().idle_ttl;
    info!("Idle session reaper running every {:?} (ttl {:?})", every, ttl);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let reaped = registry.reap_idle(ttl).await;
            if !reaped.is_empty() {
                info!("Reaped {} idle session(s)", reaped.len());
            } else {
                debug!("No idle sessions to reap");
            }
        }
    })
}
