use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ErrorInfo, JobId, JobStage, JobStatus, OutputFormat, SourceKind};

/// Decoding task requested for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscribeTask {
    Transcribe,
    Translate,
}

impl TranscribeTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscribeTask::Transcribe => "transcribe",
            TranscribeTask::Translate => "translate",
        }
    }
}

impl FromStr for TranscribeTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transcribe" => Ok(TranscribeTask::Transcribe),
            "translate" => Ok(TranscribeTask::Translate),
            _ => Err(format!("invalid task: {}", s)),
        }
    }
}

impl fmt::Display for TranscribeTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work: one end-to-end transcription request and all state
/// derived from it.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub source_kind: SourceKind,
    /// Original URL or uploaded filename, for display only.
    pub source_ref: String,
    pub webhook_url: Option<String>,
    pub status: JobStatus,
    pub stage: JobStage,
    pub progress: u8,
    pub language: Option<String>,
    pub task: TranscribeTask,
    pub initial_prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
    pub error: Option<ErrorInfo>,
    pub result_formats: Vec<OutputFormat>,
}

impl Job {
    pub fn new(
        source_kind: SourceKind,
        source_ref: impl Into<String>,
        webhook_url: Option<String>,
        retention_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::generate(),
            source_kind,
            source_ref: source_ref.into(),
            webhook_url,
            status: JobStatus::Queued,
            stage: JobStage::Queued,
            progress: 0,
            language: None,
            task: TranscribeTask::Transcribe,
            initial_prompt: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            failed_at: None,
            expires_at: now + Duration::days(retention_days),
            duration_seconds: None,
            error: None,
            result_formats: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Relative download URLs keyed by format, present once completed.
    pub fn download_urls(&self) -> Option<BTreeMap<String, String>> {
        if self.status != JobStatus::Completed {
            return None;
        }
        Some(
            self.result_formats
                .iter()
                .map(|format| {
                    (
                        format.as_str().to_string(),
                        format!("/api/jobs/{}/download?format={}", self.id, format),
                    )
                })
                .collect(),
        )
    }
}
