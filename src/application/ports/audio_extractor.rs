use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Result of converting a source container to canonical PCM audio.
#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    pub path: PathBuf,
    pub duration_seconds: f64,
}

#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Convert `source` to 16 kHz mono 16-bit PCM at `dest`.
    async fn extract(&self, source: &Path, dest: &Path)
        -> Result<ExtractedAudio, ExtractError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("source file not found: {0}")]
    SourceMissing(String),
    #[error("conversion failed: {0}")]
    ConversionFailed(String),
    #[error("media tool not available: {0}")]
    ToolMissing(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
