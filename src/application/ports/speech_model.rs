use std::path::Path;

use async_trait::async_trait;

use crate::domain::{Transcript, TranscribeTask};

/// Decoder knobs passed through to the model for one inference.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub language: Option<String>,
    pub task: TranscribeTask,
    pub temperature: f32,
    pub initial_prompt: Option<String>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            language: Some("ja".to_string()),
            task: TranscribeTask::Transcribe,
            temperature: 0.0,
            initial_prompt: None,
        }
    }
}

/// A loaded model instance, ready for inference.
///
/// Implementations own the VRAM-expensive resource; dropping the value
/// releases it.
#[async_trait]
pub trait LoadedSpeechModel: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcript, SpeechModelError>;
}

/// Factory for loading the transcription model.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn load(&self) -> Result<Box<dyn LoadedSpeechModel>, SpeechModelError>;

    /// Identifier reported by status and health endpoints.
    fn model_id(&self) -> &str;

    /// Whether a GPU is visible to this process.
    fn gpu_available(&self) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechModelError {
    #[error("model load failed: {0}")]
    LoadFailed(String),
    #[error("audio decoding failed: {0}")]
    AudioDecodeFailed(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}
