//! Session Sweeper
//!
//! Background task that hard-deletes expired admin sessions. Purely
//! housekeeping: session validation re-checks expiry on its own. Started
//! explicitly, stopped through its handle, and never started in the test
//! environment.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::application::config::IdentityConfig;
use crate::domain::repository::AdminSessionRepository;
use crate::error::IdentityResult;

pub struct SessionSweeper<R> {
    repo: Arc<R>,
    interval: Duration,
}

/// Running sweeper; dropping it without `stop` leaves the task running
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Session sweeper task failed");
        }
    }
}

impl<R> SessionSweeper<R>
where
    R: AdminSessionRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<R>, interval: Duration) -> Self {
        Self { repo, interval }
    }

    /// Spawn the periodic sweep; `None` when background jobs are disabled
    pub fn start(self, config: &IdentityConfig) -> Option<SweeperHandle> {
        if !config.background_jobs_enabled() {
            tracing::debug!("Session sweeper disabled for this environment");
            return None;
        }

        let interval_secs = self.interval.as_secs();
        let (shutdown, mut stopped) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::error!(error = %e, "Session sweep failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::info!("Session sweeper stopped");
        });

        tracing::info!(interval_secs, "Session sweeper started");
        Some(SweeperHandle { shutdown, task })
    }

    /// Delete every session past its expiry. Idempotent.
    pub async fn sweep_once(&self) -> IdentityResult<u64> {
        let deleted = self.repo.delete_expired_sessions(Utc::now()).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Expired admin sessions removed");
        }
        Ok(deleted)
    }
}
