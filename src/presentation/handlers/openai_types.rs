use std::str::FromStr;

use serde::Serialize;

/// Response serializations offered by the compatible surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Text,
    Srt,
    Vtt,
    VerboseJson,
}

impl FromStr for ResponseFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(ResponseFormat::Json),
            "text" => Ok(ResponseFormat::Text),
            "srt" => Ok(ResponseFormat::Srt),
            "vtt" => Ok(ResponseFormat::Vtt),
            "verbose_json" => Ok(ResponseFormat::VerboseJson),
            _ => Err(format!("invalid response_format: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResponse {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerboseSegment {
    pub id: usize,
    pub seek: i64,
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub tokens: Vec<i64>,
    pub temperature: f32,
    pub avg_logprob: f64,
    pub compression_ratio: f64,
    pub no_speech_prob: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionVerboseResponse {
    pub task: &'static str,
    pub language: String,
    pub duration: f64,
    pub text: String,
    pub segments: Vec<VerboseSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: &'static str,
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub object: &'static str,
    pub created: u64,
    pub owned_by: String,
}

impl ModelsResponse {
    /// The fixed catalog: the well-known alias plus the locally configured
    /// model.
    pub fn with_models(configured: &str) -> Self {
        Self {
            object: "list",
            data: vec![
                ModelInfo {
                    id: "whisper-1".to_string(),
                    object: "model",
                    created: 1_677_532_384,
                    owned_by: "openai".to_string(),
                },
                ModelInfo {
                    id: configured.to_string(),
                    object: "model",
                    created: 1_677_532_384,
                    owned_by: "local".to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompatError {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompatErrorResponse {
    pub error: CompatError,
}

impl CompatErrorResponse {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: CompatError {
                message: message.into(),
                kind: kind.into(),
            },
        }
    }
}
