use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::application::ports::{LoadedSpeechModel, SpeechBackend, TranscribeOptions};
use crate::domain::Transcript;

/// Observable state of the process-wide model slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Unloaded,
    Loading,
    Ready,
    Busy,
    Unloading,
}

/// Snapshot returned by `status()`, surfaced by health and admin endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub state: ModelState,
    pub model: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub unload_after_minutes: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelManagerError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model is busy")]
    Busy,
    #[error("inference failed: {0}")]
    Inference(String),
}

struct Slot {
    model: Option<Box<dyn LoadedSpeechModel>>,
}

/// Owns the single loaded transcription model: on-demand load, serialized
/// inference, idle unload.
///
/// The slot mutex is held for the whole of an inference, which both bounds
/// in-flight transcriptions to one and makes concurrent callers wait on the
/// same load instead of triggering their own.
pub struct ModelManager {
    backend: Arc<dyn SpeechBackend>,
    idle_timeout: Duration,
    load_timeout: Duration,
    slot: Mutex<Slot>,
    state: watch::Sender<ModelState>,
    /// Epoch milliseconds of the most recent inference completion; 0 = never.
    last_used_ms: AtomicI64,
}

impl ModelManager {
    pub fn new(
        backend: Arc<dyn SpeechBackend>,
        idle_timeout: Duration,
        load_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(ModelState::Unloaded);
        Self {
            backend,
            idle_timeout,
            load_timeout,
            slot: Mutex::new(Slot { model: None }),
            state,
            last_used_ms: AtomicI64::new(0),
        }
    }

    /// Run one inference, loading the model first if necessary.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcript, ModelManagerError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await?;
        let model = slot
            .model
            .as_ref()
            .ok_or_else(|| ModelManagerError::Unavailable("slot empty after load".into()))?;

        self.set_state(ModelState::Busy);
        let result = model.transcribe(audio_path, options).await;
        self.touch();
        self.set_state(ModelState::Ready);

        result.map_err(|e| ModelManagerError::Inference(e.to_string()))
    }

    /// Explicit warm-start load; idempotent when already loaded.
    pub async fn load(&self) -> Result<(), ModelManagerError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot).await
    }

    /// Release the model and its memory. Fails `Busy` while an inference
    /// (or a load) holds the slot; idempotent when already unloaded.
    pub fn unload(&self) -> Result<(), ModelManagerError> {
        let mut slot = self.slot.try_lock().map_err(|_| ModelManagerError::Busy)?;
        if slot.model.is_some() {
            self.set_state(ModelState::Unloading);
            slot.model = None;
            tracing::info!(model = %self.backend.model_id(), "Model unloaded, memory released");
        }
        self.set_state(ModelState::Unloaded);
        Ok(())
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            state: *self.state.borrow(),
            model: self.backend.model_id().to_string(),
            last_used_at: self.last_used(),
            unload_after_minutes: self.idle_timeout.as_secs() / 60,
        }
    }

    pub fn gpu_available(&self) -> bool {
        self.backend.gpu_available()
    }

    /// Ready, untouched for longer than the idle threshold.
    pub fn idle_expired(&self) -> bool {
        if *self.state.borrow() != ModelState::Ready {
            return false;
        }
        match self.last_used() {
            Some(at) => {
                let elapsed = Utc::now().signed_duration_since(at);
                elapsed.to_std().map(|e| e > self.idle_timeout).unwrap_or(false)
            }
            None => false,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    async fn ensure_loaded(&self, slot: &mut Slot) -> Result<(), ModelManagerError> {
        if slot.model.is_some() {
            return Ok(());
        }
        self.set_state(ModelState::Loading);
        tracing::info!(model = %self.backend.model_id(), "Loading transcription model");
        match tokio::time::timeout(self.load_timeout, self.backend.load()).await {
            Ok(Ok(model)) => {
                slot.model = Some(model);
                self.touch();
                self.set_state(ModelState::Ready);
                tracing::info!(model = %self.backend.model_id(), "Model ready");
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ModelState::Unloaded);
                tracing::error!(error = %e, "Model load failed");
                Err(ModelManagerError::Unavailable(e.to_string()))
            }
            Err(_) => {
                self.set_state(ModelState::Unloaded);
                tracing::error!("Model load timed out");
                Err(ModelManagerError::Unavailable("load timed out".into()))
            }
        }
    }

    fn set_state(&self, next: ModelState) {
        self.state.send_replace(next);
    }

    fn touch(&self) {
        self.last_used_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    fn last_used(&self) -> Option<DateTime<Utc>> {
        match self.last_used_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }
}

/// Background task that releases the model after the idle window.
///
/// Holds only a weak reference: the task dies with the manager rather than
/// keeping it alive. A busy slot is simply retried on the next tick.
pub fn spawn_idle_watcher(manager: &Arc<ModelManager>) -> JoinHandle<()> {
    let weak = Arc::downgrade(manager);
    let check_interval = (manager.idle_timeout() / 4)
        .clamp(Duration::from_millis(100), Duration::from_secs(30));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(manager) = weak.upgrade() else {
                break;
            };
            if manager.idle_expired() {
                match manager.unload() {
                    Ok(()) => {}
                    Err(ModelManagerError::Busy) => {
                        tracing::debug!("Idle unload deferred: model busy");
                    }
                    Err(e) => tracing::warn!(error = %e, "Idle unload failed"),
                }
            }
        }
    })
}
