use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::application::ports::{
    LoadedSpeechModel, SpeechBackend, SpeechModelError, TranscribeOptions,
};
use crate::domain::{Segment, Transcript, TranscribeTask};

const SAMPLE_RATE: u32 = 16_000;

/// Resolve a model identifier to a ggml weights file: either a path that
/// already exists, or a short name looked up under `{data_dir}/models/`.
pub fn resolve_model_path(data_dir: &Path, identifier: &str) -> PathBuf {
    let direct = PathBuf::from(identifier);
    if direct.is_file() {
        return direct;
    }
    data_dir.join("models").join(format!("ggml-{}.bin", identifier))
}

/// whisper.cpp backend. Loading maps the multi-gigabyte weights file; the
/// returned model holds it until dropped. All FFI runs on blocking threads.
pub struct WhisperCppBackend {
    model_path: PathBuf,
    model_id: String,
    threads: i32,
}

impl WhisperCppBackend {
    pub fn new(model_path: PathBuf, model_id: impl Into<String>, threads: usize) -> Self {
        Self {
            model_path,
            model_id: model_id.into(),
            threads: threads.max(1) as i32,
        }
    }
}

#[async_trait]
impl SpeechBackend for WhisperCppBackend {
    async fn load(&self) -> Result<Box<dyn LoadedSpeechModel>, SpeechModelError> {
        let path = self.model_path.clone();
        let ctx = tokio::task::spawn_blocking(move || {
            WhisperContext::new_with_params(
                &path.to_string_lossy(),
                WhisperContextParameters::default(),
            )
        })
        .await
        .map_err(|e| SpeechModelError::LoadFailed(e.to_string()))?
        .map_err(|e| SpeechModelError::LoadFailed(e.to_string()))?;

        Ok(Box::new(LoadedWhisper {
            ctx: Arc::new(ctx),
            threads: self.threads,
        }))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn gpu_available(&self) -> bool {
        gpu_present()
    }
}

/// Whether the NVIDIA driver is visible to this process. Checked on the
/// driver surface rather than through the model so health stays meaningful
/// while the model is unloaded.
pub fn gpu_present() -> bool {
    Path::new("/proc/driver/nvidia/version").exists() || Path::new("/dev/nvidia0").exists()
}

struct LoadedWhisper {
    ctx: Arc<WhisperContext>,
    threads: i32,
}

#[async_trait]
impl LoadedSpeechModel for LoadedWhisper {
    async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcript, SpeechModelError> {
        // Translation always decodes to English; otherwise the caller's
        // language (Japanese by default) names the output.
        let language = match options.task {
            TranscribeTask::Translate => "en".to_string(),
            TranscribeTask::Transcribe => {
                options.language.clone().unwrap_or_else(|| "ja".to_string())
            }
        };

        let ctx = Arc::clone(&self.ctx);
        let threads = self.threads;
        let options = options.clone();
        let path = audio_path.to_path_buf();
        let (segments, duration) = tokio::task::spawn_blocking(move || {
            let samples = read_pcm_samples(&path)?;
            let duration = samples.len() as f64 / SAMPLE_RATE as f64;
            let segments = run_inference(&ctx, threads, &options, &samples)?;
            Ok::<_, SpeechModelError>((segments, duration))
        })
        .await
        .map_err(|e| SpeechModelError::InferenceFailed(e.to_string()))??;

        Ok(Transcript::from_segments(language, duration, segments))
    }
}

fn run_inference(
    ctx: &WhisperContext,
    threads: i32,
    options: &TranscribeOptions,
    samples: &[f32],
) -> Result<Vec<Segment>, SpeechModelError> {
    let mut state = ctx
        .create_state()
        .map_err(|e| SpeechModelError::InferenceFailed(e.to_string()))?;

    // The tuning bundle the decoder runs with: beam search over greedy for
    // accuracy on long-form Japanese speech, no carried context so a bad
    // window cannot poison the rest of the audio.
    let mut params = FullParams::new(SamplingStrategy::BeamSearch {
        beam_size: 5,
        patience: 1.0,
    });
    params.set_n_threads(threads);
    params.set_translate(options.task == TranscribeTask::Translate);
    params.set_language(options.language.as_deref());
    params.set_no_context(true);
    params.set_single_segment(false);
    params.set_temperature(options.temperature);
    params.set_suppress_blank(true);
    params.set_token_timestamps(false);
    params.set_print_special(false);
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);
    if let Some(prompt) = options.initial_prompt.as_deref() {
        params.set_initial_prompt(prompt);
    }

    state
        .full(params, samples)
        .map_err(|e| SpeechModelError::InferenceFailed(e.to_string()))?;

    let count = state.full_n_segments();
    let mut segments = Vec::with_capacity(count as usize);
    for i in 0..count {
        let Some(segment) = state.get_segment(i) else {
            continue;
        };
        let text = segment
            .to_str()
            .map_err(|e| SpeechModelError::InferenceFailed(e.to_string()))?
            .trim()
            .to_string();
        if text.is_empty() {
            continue;
        }
        segments.push(Segment {
            id: segments.len(),
            start: segment.start_timestamp() as f64 / 100.0,
            end: segment.end_timestamp() as f64 / 100.0,
            text,
        });
    }
    Ok(segments)
}

/// Load the canonical extractor output: mono 16 kHz signed 16-bit PCM,
/// normalized to `[-1.0, 1.0]`.
fn read_pcm_samples(path: &Path) -> Result<Vec<f32>, SpeechModelError> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| SpeechModelError::AudioDecodeFailed(e.to_string()))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        return Err(SpeechModelError::AudioDecodeFailed(format!(
            "expected mono audio, got {} channels",
            spec.channels
        )));
    }
    if spec.sample_rate != SAMPLE_RATE {
        return Err(SpeechModelError::AudioDecodeFailed(format!(
            "expected {} Hz, got {} Hz",
            SAMPLE_RATE, spec.sample_rate
        )));
    }

    let mut samples = Vec::with_capacity(reader.len() as usize);
    for sample in reader.samples::<i16>() {
        let pcm = sample.map_err(|e| SpeechModelError::AudioDecodeFailed(e.to_string()))?;
        samples.push(pcm as f32 / i16::MAX as f32);
    }
    Ok(samples)
}
