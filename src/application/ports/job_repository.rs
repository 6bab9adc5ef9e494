use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ErrorInfo, Job, JobId, JobStage, JobStatus, OutputFormat};

use super::RepositoryError;

/// List filter: optional status bucket plus `created_at desc` pagination.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub limit: i64,
    pub offset: i64,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new row; fails with `DuplicateId` when the id exists.
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn get(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, RepositoryError>;

    async fn count_by_status(&self) -> Result<Vec<(JobStatus, i64)>, RepositoryError>;

    /// Advance status/stage/progress. Rejects transitions that are not
    /// reachable in the lifecycle DAG; progress never regresses.
    async fn update_progress(
        &self,
        id: &JobId,
        status: JobStatus,
        stage: JobStage,
        progress: u8,
    ) -> Result<(), RepositoryError>;

    async fn set_duration(&self, id: &JobId, duration_seconds: f64)
        -> Result<(), RepositoryError>;

    /// Terminal success; a second call on an already-completed row is a
    /// no-op.
    async fn mark_completed(
        &self,
        id: &JobId,
        duration_seconds: Option<f64>,
        result_formats: &[OutputFormat],
    ) -> Result<(), RepositoryError>;

    /// Terminal failure; a second call on an already-failed row is a no-op.
    async fn mark_failed(&self, id: &JobId, error: &ErrorInfo) -> Result<(), RepositoryError>;

    async fn delete(&self, id: &JobId) -> Result<(), RepositoryError>;

    /// Ids of jobs whose `expires_at` is before `now`.
    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, RepositoryError>;

    /// All rows not yet in a terminal state, oldest first; used by the
    /// startup recovery sweep.
    async fn non_terminal(&self) -> Result<Vec<Job>, RepositoryError>;
}
