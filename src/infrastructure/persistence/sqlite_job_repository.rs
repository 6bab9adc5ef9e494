use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::instrument;

use crate::application::ports::{JobFilter, JobRepository, RepositoryError};
use crate::domain::{
    ErrorInfo, Job, JobId, JobStage, JobStatus, OutputFormat, SourceKind, TranscribeTask,
};

pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "SELECT job_id, source_kind, source_ref, webhook_url, status, stage, \
     progress, language, task, initial_prompt, created_at, updated_at, completed_at, failed_at, \
     expires_at, duration_seconds, error_json, result_formats FROM jobs";

#[async_trait]
impl JobRepository for SqliteJobRepository {
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO jobs (job_id, source_kind, source_ref, webhook_url, status, stage, \
             progress, language, task, initial_prompt, created_at, updated_at, expires_at, \
             result_formats) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.as_str())
        .bind(job.source_kind.as_str())
        .bind(&job.source_ref)
        .bind(&job.webhook_url)
        .bind(job.status.as_str())
        .bind(job.stage.as_str())
        .bind(job.progress as i64)
        .bind(&job.language)
        .bind(job.task.as_str())
        .bind(&job.initial_prompt)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .bind(job.expires_at.to_rfc3339())
        .bind(formats_to_column(&job.result_formats))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let unique = e
                    .as_database_error()
                    .map(|d| d.is_unique_violation())
                    .unwrap_or(false);
                if unique {
                    Err(RepositoryError::DuplicateId(job.id.as_str().to_string()))
                } else {
                    Err(RepositoryError::QueryFailed(e.to_string()))
                }
            }
        }
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn get(&self, id: &JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(&format!("{} WHERE job_id = ?", SELECT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        row.map(|r| row_to_job(&r)).transpose()
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, RepositoryError> {
        let limit = if filter.limit > 0 { filter.limit } else { 100 };
        let rows = match filter.status {
            Some(status) => {
                sqlx::query(&format!(
                    "{} WHERE status = ? ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    SELECT_COLUMNS
                ))
                .bind(status.as_str())
                .bind(limit)
                .bind(filter.offset)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!(
                    "{} ORDER BY created_at DESC LIMIT ? OFFSET ?",
                    SELECT_COLUMNS
                ))
                .bind(limit)
                .bind(filter.offset)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        rows.iter().map(row_to_job).collect()
    }

    async fn count_by_status(&self) -> Result<Vec<(JobStatus, i64)>, RepositoryError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            let status = status
                .parse::<JobStatus>()
                .map_err(RepositoryError::QueryFailed)?;
            counts.push((status, row.get::<i64, _>("n")));
        }
        Ok(counts)
    }

    #[instrument(skip(self), fields(job_id = %id, status = %status))]
    async fn update_progress(
        &self,
        id: &JobId,
        status: JobStatus,
        stage: JobStage,
        progress: u8,
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let row = sqlx::query("SELECT status, progress FROM jobs WHERE job_id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound(id.as_str().to_string()));
        };

        let current: JobStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(RepositoryError::QueryFailed)?;
        if !current.can_transition_to(status) {
            return Err(RepositoryError::IllegalTransition {
                job_id: id.as_str().to_string(),
                from: current.as_str().to_string(),
                to: status.as_str().to_string(),
            });
        }

        // Observers must never see progress move backwards.
        let current_progress: i64 = row.get("progress");
        let progress = (progress as i64).max(current_progress);

        sqlx::query(
            "UPDATE jobs SET status = ?, stage = ?, progress = ?, updated_at = ? WHERE job_id = ?",
        )
        .bind(status.as_str())
        .bind(stage.as_str())
        .bind(progress)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }

    async fn set_duration(
        &self,
        id: &JobId,
        duration_seconds: f64,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE jobs SET duration_seconds = ?, updated_at = ? WHERE job_id = ?",
        )
        .bind(duration_seconds)
        .bind(Utc::now().to_rfc3339())
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.as_str().to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, result_formats), fields(job_id = %id))]
    async fn mark_completed(
        &self,
        id: &JobId,
        duration_seconds: Option<f64>,
        result_formats: &[OutputFormat],
    ) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let row = sqlx::query("SELECT status, duration_seconds FROM jobs WHERE job_id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound(id.as_str().to_string()));
        };
        let current: JobStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(RepositoryError::QueryFailed)?;
        if current == JobStatus::Completed {
            return Ok(());
        }
        if !current.can_transition_to(JobStatus::Completed) {
            return Err(RepositoryError::IllegalTransition {
                job_id: id.as_str().to_string(),
                from: current.as_str().to_string(),
                to: JobStatus::Completed.as_str().to_string(),
            });
        }

        let duration = duration_seconds.or_else(|| row.get::<Option<f64>, _>("duration_seconds"));
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = 'completed', stage = 'completed', progress = 100, \
             completed_at = ?, updated_at = ?, duration_seconds = ?, result_formats = ? \
             WHERE job_id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(duration)
        .bind(formats_to_column(result_formats))
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }

    #[instrument(skip(self, error), fields(job_id = %id, kind = %error.kind))]
    async fn mark_failed(&self, id: &JobId, error: &ErrorInfo) -> Result<(), RepositoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        let row = sqlx::query("SELECT status FROM jobs WHERE job_id = ?")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        let Some(row) = row else {
            return Err(RepositoryError::NotFound(id.as_str().to_string()));
        };
        let current: JobStatus = row
            .get::<String, _>("status")
            .parse()
            .map_err(RepositoryError::QueryFailed)?;
        if current == JobStatus::Failed {
            return Ok(());
        }
        if current == JobStatus::Completed {
            return Err(RepositoryError::IllegalTransition {
                job_id: id.as_str().to_string(),
                from: current.as_str().to_string(),
                to: JobStatus::Failed.as_str().to_string(),
            });
        }

        let error_json = serde_json::to_string(error)
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE jobs SET status = 'failed', stage = 'failed', failed_at = ?, \
             updated_at = ?, error_json = ? WHERE job_id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(error_json)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))
    }

    #[instrument(skip(self), fields(job_id = %id))]
    async fn delete(&self, id: &JobId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM jobs WHERE job_id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.as_str().to_string()));
        }
        Ok(())
    }

    async fn expired(&self, now: DateTime<Utc>) -> Result<Vec<JobId>, RepositoryError> {
        let rows = sqlx::query("SELECT job_id FROM jobs WHERE expires_at < ?")
            .bind(now.to_rfc3339())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        rows.iter()
            .map(|r| {
                r.get::<String, _>("job_id")
                    .parse::<JobId>()
                    .map_err(RepositoryError::QueryFailed)
            })
            .collect()
    }

    async fn non_terminal(&self) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "{} WHERE status NOT IN ('completed', 'failed') ORDER BY created_at ASC",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?;
        rows.iter().map(row_to_job).collect()
    }
}

fn formats_to_column(formats: &[OutputFormat]) -> String {
    formats
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

fn formats_from_column(raw: &str) -> Result<Vec<OutputFormat>, RepositoryError> {
    raw.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<OutputFormat>().map_err(RepositoryError::QueryFailed))
        .collect()
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| RepositoryError::QueryFailed(format!("bad timestamp {}: {}", raw, e)))
}

fn row_to_job(row: &SqliteRow) -> Result<Job, RepositoryError> {
    let error = match row.get::<Option<String>, _>("error_json") {
        Some(raw) => Some(
            serde_json::from_str::<ErrorInfo>(&raw)
                .map_err(|e| RepositoryError::QueryFailed(e.to_string()))?,
        ),
        None => None,
    };

    Ok(Job {
        id: row
            .get::<String, _>("job_id")
            .parse::<JobId>()
            .map_err(RepositoryError::QueryFailed)?,
        source_kind: row
            .get::<String, _>("source_kind")
            .parse::<SourceKind>()
            .map_err(RepositoryError::QueryFailed)?,
        source_ref: row.get("source_ref"),
        webhook_url: row.get("webhook_url"),
        status: row
            .get::<String, _>("status")
            .parse::<JobStatus>()
            .map_err(RepositoryError::QueryFailed)?,
        stage: row
            .get::<String, _>("stage")
            .parse::<JobStage>()
            .map_err(RepositoryError::QueryFailed)?,
        progress: row.get::<i64, _>("progress").clamp(0, 100) as u8,
        language: row.get("language"),
        task: row
            .get::<String, _>("task")
            .parse::<TranscribeTask>()
            .map_err(RepositoryError::QueryFailed)?,
        initial_prompt: row.get("initial_prompt"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&row.get::<String, _>("updated_at"))?,
        completed_at: row
            .get::<Option<String>, _>("completed_at")
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        failed_at: row
            .get::<Option<String>, _>("failed_at")
            .as_deref()
            .map(parse_timestamp)
            .transpose()?,
        expires_at: parse_timestamp(&row.get::<String, _>("expires_at"))?,
        duration_seconds: row.get("duration_seconds"),
        error,
        result_formats: formats_from_column(&row.get::<String, _>("result_formats"))?,
    })
}
