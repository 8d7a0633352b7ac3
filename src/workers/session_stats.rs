use crate::tracking::SessionStore;

pub async fn run(sessions: &SessionStore) {
    let stats = sessions.stats().await;
    tracing::info!(
        active = stats.active_sessions,
        busy = stats.busy_sessions,
        "session_stats"
    );
}
