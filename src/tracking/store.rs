//! 会话存储：按会话 key 隔离，每个会话一把锁
//!
//! 外层 map 锁只在查找/插入/清理时短暂持有；帧处理与重置持有会话自身的锁，
//! 因此同一会话的请求串行执行，不同会话之间互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::tracking::config::TrackingConfig;
use crate::tracking::session::{Session, SessionResults};
use crate::tracking::types::{FrameMetrics, LandmarkFrame};

pub const DEFAULT_SESSION_KEY: &str = "default";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("active session limit reached ({max})")]
    SessionLimit { max: usize },
    #[error("session data serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct SessionSlot {
    session: Arc<Mutex<Session>>,
    last_active: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub active_sessions: usize,
    pub busy_sessions: usize,
}

pub struct SessionStore {
    config: Arc<TrackingConfig>,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(config: TrackingConfig, max_sessions: usize) -> Self {
        Self {
            config: Arc::new(config),
            sessions: Mutex::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
        }
    }

    /// 取出（必要时创建）会话句柄并刷新活跃时间
    async fn acquire(&self, key: &str) -> Result<Arc<Mutex<Session>>, StoreError> {
        let mut sessions = self.sessions.lock().await;

        if let Some(slot) = sessions.get_mut(key) {
            slot.last_active = Instant::now();
            return Ok(slot.session.clone());
        }

        if sessions.len() >= self.max_sessions {
            tracing::warn!(max = self.max_sessions, "Session limit reached");
            return Err(StoreError::SessionLimit {
                max: self.max_sessions,
            });
        }

        let session = Arc::new(Mutex::new(Session::new(self.config.clone())));
        sessions.insert(
            key.to_string(),
            SessionSlot {
                session: session.clone(),
                last_active: Instant::now(),
            },
        );
        tracing::info!(session_id = key, "Tracking session created");
        Ok(session)
    }

    async fn existing(&self, key: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions
            .lock()
            .await
            .get(key)
            .map(|slot| slot.session.clone())
    }

    pub async fn process_frame(
        &self,
        key: &str,
        frame: &LandmarkFrame,
    ) -> Result<FrameMetrics, StoreError> {
        let handle = self.acquire(key).await?;
        let mut session = handle.lock().await;
        Ok(session.process_frame(frame))
    }

    /// 会话不存在时返回全新会话的结果，但不创建会话
    pub async fn results(&self, key: &str) -> Result<SessionResults, StoreError> {
        match self.existing(key).await {
            Some(handle) => Ok(handle.lock().await.results()?),
            None => Ok(Session::new(self.config.clone()).results()?),
        }
    }

    /// 与同一会话上的帧处理互斥；不存在的会话视为已是初始状态
    pub async fn reset(&self, key: &str) {
        if let Some(handle) = self.existing(key).await {
            handle.lock().await.reset();
            tracing::info!(session_id = key, "Tracking session reset");
        }
    }

    /// 清理空闲会话；仍被请求持有的会话跳过
    pub async fn prune_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, slot| {
            Arc::strong_count(&slot.session) > 1 || slot.last_active.elapsed() < ttl
        });
        before - sessions.len()
    }

    pub async fn stats(&self) -> StoreStats {
        let sessions = self.sessions.lock().await;
        StoreStats {
            active_sessions: sessions.len(),
            busy_sessions: sessions
                .values()
                .filter(|slot| Arc::strong_count(&slot.session) > 1)
                .count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::types::{fixtures, Detection};

    fn store(max: usize) -> SessionStore {
        SessionStore::new(TrackingConfig::default(), max)
    }

    fn away_frame(t: f64) -> LandmarkFrame {
        LandmarkFrame::new(t, Detection::default()).unwrap()
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = store(8);
        for i in 0..3 {
            store.process_frame("a", &away_frame(i as f64)).await.unwrap();
        }
        store.process_frame("b", &away_frame(0.0)).await.unwrap();

        let a = store.results("a").await.unwrap();
        let b = store.results("b").await.unwrap();
        assert_eq!(a.posture_states.away, 3);
        assert_eq!(b.posture_states.away, 1);
    }

    #[tokio::test]
    async fn unknown_session_reads_defaults_without_creating() {
        let store = store(8);
        let results = store.results("ghost").await.unwrap();
        assert_eq!(results.attentiveness_score, 75.0);
        assert_eq!(store.stats().await.active_sessions, 0);
    }

    #[tokio::test]
    async fn reset_clears_only_target_session() {
        let store = store(8);
        let frame = fixtures::frame(0.0, Some(fixtures::neutral_face()), None);
        store.process_frame("a", &frame).await.unwrap();
        store.process_frame("b", &frame).await.unwrap();

        store.reset("a").await;
        assert_eq!(store.results("a").await.unwrap().facial_expressions.total(), 0);
        assert_eq!(store.results("b").await.unwrap().facial_expressions.total(), 1);
    }

    #[tokio::test]
    async fn refuses_sessions_beyond_limit() {
        let store = store(2);
        store.process_frame("a", &away_frame(0.0)).await.unwrap();
        store.process_frame("b", &away_frame(0.0)).await.unwrap();
        let err = store.process_frame("c", &away_frame(0.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::SessionLimit { max: 2 }));
        // 已有会话不受影响
        assert!(store.process_frame("a", &away_frame(1.0)).await.is_ok());
    }

    #[tokio::test]
    async fn prune_skips_held_sessions() {
        let store = store(8);
        store.process_frame("idle", &away_frame(0.0)).await.unwrap();
        store.process_frame("busy", &away_frame(0.0)).await.unwrap();

        let held = store.acquire("busy").await.unwrap();
        let _guard = held.lock().await;

        let removed = store.prune_idle(Duration::ZERO).await;
        assert_eq!(removed, 1);
        let stats = store.stats().await;
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.busy_sessions, 1);
    }

    #[tokio::test]
    async fn concurrent_frames_on_one_session_are_serialized() {
        let store = Arc::new(store(8));
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.process_frame("shared", &away_frame(i as f64)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let results = store.results("shared").await.unwrap();
        assert_eq!(results.posture_states.away, 16);
    }
}
