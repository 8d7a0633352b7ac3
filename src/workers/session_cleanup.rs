use std::time::Duration;

use crate::tracking::SessionStore;

pub async fn run(sessions: &SessionStore, idle_ttl: Duration) {
    tracing::debug!("session_cleanup: start");
    let removed = sessions.prune_idle(idle_ttl).await;
    if removed > 0 {
        tracing::info!(removed, "session_cleanup: pruned idle sessions");
    } else {
        tracing::debug!("session_cleanup: done");
    }
}
