use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::application::ports::JobRepository;
use crate::infrastructure::storage::JobWorkspace;

/// Periodic deletion of jobs past their retention horizon: directory first,
/// then row, so a crash between the two leaves no orphaned files.
pub struct RetentionSweeper {
    repository: Arc<dyn JobRepository>,
    workspace: Arc<JobWorkspace>,
    interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        repository: Arc<dyn JobRepository>,
        workspace: Arc<JobWorkspace>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            workspace,
            interval,
        }
    }

    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so startup recovery can
        // finish re-queuing before anything is swept.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = self.sweep_once().await;
            if removed > 0 {
                tracing::info!(removed, "Retention sweep removed expired jobs");
            }
        }
    }

    /// One pass over expired jobs. Failures are logged and retried on the
    /// next tick; the sweep itself never stops.
    pub async fn sweep_once(&self) -> usize {
        let expired = match self.repository.expired(Utc::now()).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Retention sweep could not list expired jobs");
                return 0;
            }
        };

        let mut removed = 0;
        for id in expired {
            if let Err(e) = self.workspace.remove(&id).await {
                tracing::warn!(job_id = %id, error = %e, "Could not remove expired job directory");
                continue;
            }
            match self.repository.delete(&id).await {
                Ok(()) => {
                    tracing::debug!(job_id = %id, "Expired job removed");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Could not delete expired job row");
                }
            }
        }
        removed
    }
}
