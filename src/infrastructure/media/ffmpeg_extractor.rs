use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::application::ports::{AudioExtractor, ExtractError, ExtractedAudio};

const STDERR_LIMIT: usize = 1000;

/// Converts any source container into the canonical model input: single
/// channel, 16 000 Hz, signed 16-bit little-endian PCM.
pub struct FfmpegExtractor {
    ffmpeg: String,
    ffprobe: String,
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegExtractor {
    pub fn new() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }

    async fn probe_duration(&self, audio: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe)
            .arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(audio)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout).trim().parse().ok()
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(
        &self,
        source: &Path,
        dest: &Path,
    ) -> Result<ExtractedAudio, ExtractError> {
        if !source.is_file() {
            return Err(ExtractError::SourceMissing(
                source.display().to_string(),
            ));
        }

        let output = Command::new(&self.ffmpeg)
            .arg("-i")
            .arg(source)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg("-y")
            .arg(dest)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExtractError::ToolMissing("ffmpeg is not installed".to_string())
                } else {
                    ExtractError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(ExtractError::ConversionFailed(stderr_tail(&output.stderr)));
        }

        let duration_seconds = match self.probe_duration(dest).await {
            Some(d) => d,
            None => {
                tracing::warn!(path = %dest.display(), "Could not probe audio duration");
                0.0
            }
        };

        tracing::debug!(
            path = %dest.display(),
            duration = duration_seconds,
            "Audio extracted"
        );
        Ok(ExtractedAudio {
            path: dest.to_path_buf(),
            duration_seconds,
        })
    }
}

/// Final chunk of stderr, where ffmpeg puts the actual failure reason.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim_end();
    if trimmed.len() <= STDERR_LIMIT {
        trimmed.to_string()
    } else {
        let start = trimmed
            .char_indices()
            .rev()
            .take_while(|(i, _)| trimmed.len() - i <= STDERR_LIMIT)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0);
        trimmed[start..].to_string()
    }
}
