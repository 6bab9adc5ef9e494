use std::time::Duration;

use serde_json::json;

use crate::domain::{Job, JobStatus};

const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("permanent rejection: status {0}")]
    Rejected(u16),
    #[error("delivery exhausted after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Best-effort POST of terminal events to the caller-supplied URL.
///
/// Runs outside the pipeline's critical path: outcomes are logged, never
/// reflected in the job's status.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl Default for WebhookNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookNotifier {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Deliver the terminal event for `job`, retrying transport failures,
    /// 5xx, and 429 with doubling backoff. Other 4xx are permanent.
    pub async fn deliver(&self, job: &Job) -> Result<(), WebhookError> {
        let Some(url) = job.webhook_url.as_deref() else {
            return Ok(());
        };
        let payload = Self::payload(job);

        let mut backoff = BASE_BACKOFF;
        let mut last_error = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.post(url).json(&payload).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        tracing::info!(job_id = %job.id, attempt, "Webhook delivered");
                        return Ok(());
                    }
                    if status.is_client_error() && status.as_u16() != 429 {
                        tracing::warn!(
                            job_id = %job.id,
                            status = status.as_u16(),
                            "Webhook rejected, not retrying"
                        );
                        return Err(WebhookError::Rejected(status.as_u16()));
                    }
                    last_error = format!("status {}", status.as_u16());
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }
            if attempt < MAX_ATTEMPTS {
                tracing::debug!(
                    job_id = %job.id,
                    attempt,
                    error = %last_error,
                    "Webhook attempt failed, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(WebhookError::Exhausted {
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }

    fn payload(job: &Job) -> serde_json::Value {
        match job.status {
            JobStatus::Completed => json!({
                "event": "job.completed",
                "job_id": job.id,
                "status": "completed",
                "download_urls": job.download_urls(),
            }),
            _ => json!({
                "event": "job.failed",
                "job_id": job.id,
                "status": "failed",
                "error": job.error,
            }),
        }
    }
}
