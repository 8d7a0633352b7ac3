pub mod session_cleanup;
pub mod session_stats;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::{SessionConfig, WorkerConfig};
use crate::tracking::SessionStore;

/// 单次 worker 调用的超时
const WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// 关闭调度器前等待进行中任务的时间
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    SessionCleanup,
    SessionStats,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionCleanup => "session_cleanup",
            Self::SessionStats => "session_stats",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: String,
    pub enabled: bool,
}

pub struct WorkerManager {
    sessions: Arc<SessionStore>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
    idle_ttl: Duration,
}

impl WorkerManager {
    pub fn new(
        sessions: Arc<SessionStore>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
        session: &SessionConfig,
    ) -> Self {
        Self {
            sessions,
            shutdown_rx,
            config: config.clone(),
            idle_ttl: Duration::from_secs(session.idle_ttl_secs),
        }
    }

    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.enabled {
            return Vec::new();
        }
        vec![
            JobSpec {
                name: WorkerName::SessionCleanup,
                cron: self.config.session_cleanup_cron.clone(),
                enabled: !self.idle_ttl.is_zero(),
            },
            JobSpec {
                name: WorkerName::SessionStats,
                cron: self.config.session_stats_cron.clone(),
                enabled: true,
            },
        ]
    }

    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.enabled {
            tracing::info!("Workers disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;
        self.register_jobs(&scheduler).await;
        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            drain_ms = DRAIN_TIMEOUT.as_millis() as u64,
            "Worker manager shutting down"
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for spec in self.planned_jobs() {
            let name_str = spec.name.as_str();
            if !spec.enabled {
                tracing::info!(name = name_str, "Skipping disabled worker");
                continue;
            }

            let sessions = self.sessions.clone();
            match spec.name {
                WorkerName::SessionCleanup => {
                    let ttl = self.idle_ttl;
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let sessions = sessions.clone();
                        async move {
                            session_cleanup::run(&sessions, ttl).await;
                        }
                    })
                    .await;
                }
                WorkerName::SessionStats => {
                    add_job(scheduler, &spec.cron, name_str, move || {
                        let sessions = sessions.clone();
                        async move {
                            session_stats::run(&sessions).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = %spec.cron, "Registered worker");
        }
    }
}

/// 注册带重入保护和超时的定时任务
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));

    let job = Job::new_async(cron, move |_uuid, _lock| {
        let guard = running.clone();

        if guard
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(worker = name, "Skipping worker invocation: previous run still in progress");
            return Box::pin(async {});
        }

        let fut = run();
        Box::pin(async move {
            if tokio::time::timeout(WORKER_TIMEOUT, fut).await.is_err() {
                tracing::error!(
                    worker = name,
                    timeout_secs = WORKER_TIMEOUT.as_secs(),
                    "Worker timed out"
                );
            }
            guard.store(false, Ordering::SeqCst);
        })
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error = %err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error = %err, cron, worker = name, "Failed to create worker job"),
    }
}

#[cfg(test)]
mod tests {
    use crate::tracking::TrackingConfig;

    use super::*;

    fn manager(enabled: bool, idle_ttl_secs: u64) -> WorkerManager {
        let sessions = Arc::new(SessionStore::new(TrackingConfig::default(), 4));
        let (tx, _) = broadcast::channel(2);
        let worker = WorkerConfig {
            enabled,
            session_cleanup_cron: "0 */5 * * * *".into(),
            session_stats_cron: "0 * * * * *".into(),
        };
        let session = SessionConfig {
            max_sessions: 4,
            idle_ttl_secs,
        };
        WorkerManager::new(sessions, tx.subscribe(), &worker, &session)
    }

    #[tokio::test]
    async fn disabled_manager_plans_nothing() {
        assert!(manager(false, 60).planned_jobs().is_empty());
    }

    #[tokio::test]
    async fn zero_ttl_disables_cleanup() {
        let jobs = manager(true, 0).planned_jobs();
        let cleanup = jobs
            .iter()
            .find(|j| j.name == WorkerName::SessionCleanup)
            .unwrap();
        assert!(!cleanup.enabled);
    }

    #[tokio::test]
    async fn disabled_start_returns_immediately() {
        manager(false, 60)
            .start()
            .await
            .expect("disabled start should succeed");
    }

    #[test]
    fn worker_names_have_str() {
        for name in [WorkerName::SessionCleanup, WorkerName::SessionStats] {
            assert!(!name.as_str().is_empty());
        }
    }
}
