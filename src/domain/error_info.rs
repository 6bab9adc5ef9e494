use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Failure classification shared by the pipeline, the store, and the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    DuplicateId,
    PayloadTooLarge,
    QueueFull,
    NotFound,
    IllegalTransition,
    DownloadError,
    ExtractError,
    TranscriptionError,
    FormatError,
    ModelUnavailable,
    Timeout,
    StaleStorage,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::DuplicateId => "duplicate_id",
            ErrorKind::PayloadTooLarge => "payload_too_large",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::NotFound => "not_found",
            ErrorKind::IllegalTransition => "illegal_transition",
            ErrorKind::DownloadError => "download_error",
            ErrorKind::ExtractError => "extract_error",
            ErrorKind::TranscriptionError => "transcription_error",
            ErrorKind::FormatError => "format_error",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::StaleStorage => "stale_storage",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validation_error" => Ok(ErrorKind::ValidationError),
            "duplicate_id" => Ok(ErrorKind::DuplicateId),
            "payload_too_large" => Ok(ErrorKind::PayloadTooLarge),
            "queue_full" => Ok(ErrorKind::QueueFull),
            "not_found" => Ok(ErrorKind::NotFound),
            "illegal_transition" => Ok(ErrorKind::IllegalTransition),
            "download_error" => Ok(ErrorKind::DownloadError),
            "extract_error" => Ok(ErrorKind::ExtractError),
            "transcription_error" => Ok(ErrorKind::TranscriptionError),
            "format_error" => Ok(ErrorKind::FormatError),
            "model_unavailable" => Ok(ErrorKind::ModelUnavailable),
            "timeout" => Ok(ErrorKind::Timeout),
            "stale_storage" => Ok(ErrorKind::StaleStorage),
            "internal_error" => Ok(ErrorKind::InternalError),
        _ => Err(format!("invalid error kind: {}", s)),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error recorded on a failed job and surfaced through the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
