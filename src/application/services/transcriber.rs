use std::path::Path;
use std::sync::Arc;

use crate::application::ports::TranscribeOptions;
use crate::domain::Transcript;

use super::model_manager::{ModelManager, ModelManagerError};

#[derive(Debug, thiserror::Error)]
pub enum TranscriberError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("transcription failed: {0}")]
    Failed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Thin adapter between the pipeline and the model manager: runs inference
/// on the canonical audio and persists `transcript.json`.
pub struct Transcriber {
    models: Arc<ModelManager>,
}

impl Transcriber {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self { models }
    }

    /// Transcribe `audio_path` and write the canonical transcript into
    /// `output_dir`. A failed load is retried once before surfacing.
    pub async fn run(
        &self,
        audio_path: &Path,
        output_dir: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcript, TranscriberError> {
        let transcript = match self.models.transcribe(audio_path, options).await {
            Ok(t) => t,
            Err(ModelManagerError::Unavailable(first)) => {
                tracing::warn!(error = %first, "Model unavailable, retrying once");
                self.models
                    .transcribe(audio_path, options)
                    .await
                    .map_err(|e| match e {
                        ModelManagerError::Unavailable(msg) => {
                            TranscriberError::ModelUnavailable(msg)
                        }
                        other => TranscriberError::Failed(other.to_string()),
                    })?
            }
            Err(e) => return Err(TranscriberError::Failed(e.to_string())),
        };

        let body = serde_json::to_vec_pretty(&transcript)?;
        tokio::fs::write(output_dir.join("transcript.json"), body).await?;
        Ok(transcript)
    }
}
