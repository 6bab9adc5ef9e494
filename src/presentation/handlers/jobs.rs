use std::collections::BTreeMap;
use std::path::Path;

use axum::body::Body;
use axum::extract::{Multipart, Path as UrlPath, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::domain::{
    ErrorInfo, ErrorKind, Job, JobId, JobStage, JobStatus, OutputFormat, SourceKind,
};
use crate::infrastructure::storage::WorkspaceError;
use crate::presentation::state::AppState;

use super::auth::require_api_key;
use super::ApiError;

#[derive(Serialize)]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub source_kind: SourceKind,
    pub source_ref: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_urls: Option<BTreeMap<String, String>>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.as_str().to_string(),
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            source_kind: job.source_kind,
            source_ref: job.source_ref.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            failed_at: job.failed_at,
            expires_at: job.expires_at,
            duration_seconds: job.duration_seconds,
            error: job.error.clone(),
            download_urls: job.download_urls(),
        }
    }
}

/// Pick an id that is free in the store. The random space makes collisions
/// vanishingly rare; the insert's unique constraint remains the backstop.
async fn allocate_job_id(state: &AppState) -> Result<JobId, ApiError> {
    for _ in 0..5 {
        let id = JobId::generate();
        if state.repository.get(&id).await?.is_none() {
            return Ok(id);
        }
    }
    Err(ApiError::internal("could not allocate a job id"))
}

/// Shared admission path: reserve a queue slot, commit the row, enqueue.
/// Used by the native surface and the OpenAI-compatible surface alike.
pub(super) async fn admit_job(state: &AppState, job: &Job) -> Result<(), ApiError> {
    let slot = state
        .processor
        .reserve_slot()
        .map_err(ApiError::from_info)?;
    state.repository.insert(job).await?;
    slot.send(job.id.clone());
    Ok(())
}

struct UploadedFile {
    filename: String,
    size_bytes: u64,
}

/// Stream one multipart file field into the job's input directory,
/// enforcing the upload cap mid-stream.
pub(super) async fn stage_upload(
    state: &AppState,
    id: &JobId,
    field: &mut axum::extract::multipart::Field<'_>,
) -> Result<u64, ApiError> {
    let extension = field
        .file_name()
        .and_then(|name| Path::new(name).extension())
        .map(|ext| ext.to_string_lossy().to_string())
        .unwrap_or_else(|| "bin".to_string());

    state
        .workspace
        .create_layout(id)
        .await
        .map_err(|e| ApiError::internal(format!("workspace setup failed: {}", e)))?;

    let byte_stream: BoxStream<'_, Result<Bytes, std::io::Error>> =
        Box::pin(async_stream::stream! {
            loop {
                match field.chunk().await {
                    Ok(Some(bytes)) => yield Ok(bytes),
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(std::io::Error::other(e.to_string()));
                        break;
                    }
                }
            }
        });

    let max_bytes = state.settings.max_upload_bytes();
    match state
        .workspace
        .store_upload(id, &extension, byte_stream, max_bytes)
        .await
    {
        Ok(size) => Ok(size),
        Err(WorkspaceError::TooLarge) => {
            let _ = state.workspace.remove(id).await;
            Err(ApiError::from_info(ErrorInfo::new(
                ErrorKind::PayloadTooLarge,
                format!("upload exceeds {} MB", state.settings.max_upload_size_mb),
            )))
        }
        Err(e) => {
            let _ = state.workspace.remove(id).await;
            Err(ApiError::internal(format!("upload staging failed: {}", e)))
        }
    }
}

fn valid_webhook_url(url: &str) -> bool {
    (url.starts_with("http://") || url.starts_with("https://"))
        && !url.chars().any(char::is_whitespace)
}

#[tracing::instrument(skip(state, multipart, headers))]
pub async fn create_job_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&state.settings, &headers)?;

    let id = allocate_job_id(&state).await?;
    let mut url: Option<String> = None;
    let mut webhook_url: Option<String> = None;
    let mut uploaded: Option<UploadedFile> = None;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let _ = state.workspace.remove(&id).await;
                return Err(ApiError::validation(format!("malformed multipart: {}", e)));
            }
        };
        match field.name().unwrap_or("") {
            "url" => {
                url = Some(field.text().await.map_err(|e| {
                    ApiError::validation(format!("unreadable url field: {}", e))
                })?);
            }
            "webhook_url" => {
                let value = field.text().await.map_err(|e| {
                    ApiError::validation(format!("unreadable webhook_url field: {}", e))
                })?;
                if !value.is_empty() {
                    webhook_url = Some(value);
                }
            }
            "file" => {
                if uploaded.is_some() {
                    let _ = state.workspace.remove(&id).await;
                    return Err(ApiError::validation("more than one file provided"));
                }
                let filename = field.file_name().unwrap_or("upload").to_string();
                let size_bytes = stage_upload(&state, &id, &mut field).await?;
                uploaded = Some(UploadedFile {
                    filename,
                    size_bytes,
                });
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown form field");
            }
        }
    }

    let url = url.filter(|u| !u.is_empty());
    if url.is_some() == uploaded.is_some() {
        let _ = state.workspace.remove(&id).await;
        return Err(ApiError::validation(
            "exactly one of 'url' or 'file' must be provided",
        ));
    }
    if let Some(hook) = webhook_url.as_deref() {
        if !valid_webhook_url(hook) {
            let _ = state.workspace.remove(&id).await;
            return Err(ApiError::validation(
                "webhook_url must be an absolute http(s) url",
            ));
        }
    }

    let mut job = if let Some(url) = &url {
        Job::new(
            SourceKind::Url,
            url.clone(),
            webhook_url,
            state.settings.job_retention_days,
        )
    } else if let Some(file) = &uploaded {
        tracing::debug!(bytes = file.size_bytes, "Upload staged");
        Job::new(
            SourceKind::Upload,
            file.filename.clone(),
            webhook_url,
            state.settings.job_retention_days,
        )
    } else {
        let _ = state.workspace.remove(&id).await;
        return Err(ApiError::validation(
            "exactly one of 'url' or 'file' must be provided",
        ));
    };
    job.id = id.clone();

    state
        .workspace
        .create_layout(&id)
        .await
        .map_err(|e| ApiError::internal(format!("workspace setup failed: {}", e)))?;

    if let Err(e) = admit_job(&state, &job).await {
        let _ = state.workspace.remove(&id).await;
        return Err(e);
    }

    tracing::info!(job_id = %id, source = %job.source_kind, "Job accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: id.as_str().to_string(),
            status: JobStatus::Queued,
            created_at: job.created_at,
            expires_at: job.expires_at,
        }),
    ))
}

#[tracing::instrument(skip(state))]
pub async fn get_job_handler(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<String>,
) -> Result<Json<JobResponse>, ApiError> {
    let id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::validation(format!("invalid job id: {}", job_id)))?;
    let job = state
        .repository
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job not found: {}", job_id)))?;
    Ok(Json(JobResponse::from(&job)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

#[derive(Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub total: usize,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<JobListResponse>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            s.parse::<JobStatus>()
                .map_err(|_| ApiError::validation(format!("invalid status filter: {}", s)))
        })
        .transpose()?;
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let offset = query.offset.unwrap_or(0).max(0);

    let jobs = state
        .repository
        .list(crate::application::ports::JobFilter {
            status,
            limit,
            offset,
        })
        .await?;
    let jobs: Vec<JobResponse> = jobs.iter().map(JobResponse::from).collect();
    Ok(Json(JobListResponse {
        total: jobs.len(),
        jobs,
        limit,
        offset,
    }))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
}

#[tracing::instrument(skip(state))]
pub async fn download_handler(
    State(state): State<AppState>,
    UrlPath(job_id): UrlPath<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::validation(format!("invalid job id: {}", job_id)))?;
    let format: OutputFormat = query
        .format
        .as_deref()
        .unwrap_or("json")
        .parse()
        .map_err(|e| ApiError::validation(e))?;

    let job = state
        .repository
        .get(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job not found: {}", job_id)))?;
    if job.status != JobStatus::Completed || !job.result_formats.contains(&format) {
        return Err(ApiError::not_found(format!(
            "no {} artifact for job {}",
            format, job_id
        )));
    }

    let path = state.workspace.artifact_path(&id, format);
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::not_found(format!("artifact missing on disk: {}", format)))?;
    let body = Body::from_stream(ReaderStream::new(file));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}.{}\"", job_id, format),
        )
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}

#[tracing::instrument(skip(state, headers))]
pub async fn delete_job_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    UrlPath(job_id): UrlPath<String>,
) -> Result<StatusCode, ApiError> {
    require_api_key(&state.settings, &headers)?;
    let id: JobId = job_id
        .parse()
        .map_err(|_| ApiError::validation(format!("invalid job id: {}", job_id)))?;

    if state.repository.get(&id).await?.is_none() {
        return Err(ApiError::not_found(format!("job not found: {}", job_id)));
    }

    // Directory first, then row: a crash in between is picked up by the
    // startup stale sweep rather than leaking files.
    state
        .workspace
        .remove(&id)
        .await
        .map_err(|e| ApiError::internal(format!("could not remove job directory: {}", e)))?;
    state.repository.delete(&id).await?;

    tracing::info!(job_id = %id, "Job deleted");
    Ok(StatusCode::NO_CONTENT)
}
