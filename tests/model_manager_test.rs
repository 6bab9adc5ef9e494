use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use kikitori::application::ports::{
    LoadedSpeechModel, SpeechBackend, SpeechModelError, TranscribeOptions,
};
use kikitori::application::services::{
    spawn_idle_watcher, ModelManager, ModelManagerError, ModelState,
};
use kikitori::domain::{Segment, Transcript};

struct MockBackend {
    loads: Arc<AtomicUsize>,
    fail_loads: usize,
    inference_delay: Duration,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            loads: Arc::new(AtomicUsize::new(0)),
            fail_loads: 0,
            inference_delay: Duration::ZERO,
        }
    }
}

struct MockModel {
    inference_delay: Duration,
}

#[async_trait]
impl LoadedSpeechModel for MockModel {
    async fn transcribe(
        &self,
        _audio_path: &Path,
        _options: &TranscribeOptions,
    ) -> Result<Transcript, SpeechModelError> {
        tokio::time::sleep(self.inference_delay).await;
        Ok(Transcript::from_segments(
            "ja",
            1.0,
            vec![Segment {
                id: 0,
                start: 0.0,
                end: 1.0,
                text: "テスト".to_string(),
            }],
        ))
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    async fn load(&self) -> Result<Box<dyn LoadedSpeechModel>, SpeechModelError> {
        let count = self.loads.fetch_add(1, Ordering::SeqCst);
        if count < self.fail_loads {
            return Err(SpeechModelError::LoadFailed("mock load failure".into()));
        }
        Ok(Box::new(MockModel {
            inference_delay: self.inference_delay,
        }))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }

    fn gpu_available(&self) -> bool {
        false
    }
}

fn manager_with(backend: MockBackend, idle: Duration) -> (Arc<ModelManager>, Arc<AtomicUsize>) {
    let loads = Arc::clone(&backend.loads);
    let manager = Arc::new(ModelManager::new(
        Arc::new(backend),
        idle,
        Duration::from_secs(5),
    ));
    (manager, loads)
}

#[tokio::test]
async fn given_unloaded_manager_when_transcribing_then_model_loads_on_demand_once() {
    let (manager, loads) = manager_with(MockBackend::new(), Duration::from_secs(300));
    assert_eq!(manager.status().state, ModelState::Unloaded);

    for _ in 0..5 {
        manager
            .transcribe(Path::new("audio.wav"), &TranscribeOptions::default())
            .await
            .expect("transcription should succeed");
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1, "burst must load once");
    assert_eq!(manager.status().state, ModelState::Ready);
    assert!(manager.status().last_used_at.is_some());
}

#[tokio::test]
async fn given_failing_backend_when_transcribing_then_unavailable_and_slot_unloaded() {
    let backend = MockBackend {
        fail_loads: usize::MAX,
        ..MockBackend::new()
    };
    let (manager, _) = manager_with(backend, Duration::from_secs(300));

    let result = manager
        .transcribe(Path::new("audio.wav"), &TranscribeOptions::default())
        .await;
    assert!(matches!(result, Err(ModelManagerError::Unavailable(_))));
    assert_eq!(manager.status().state, ModelState::Unloaded);
}

#[tokio::test]
async fn given_one_failed_load_when_retrying_then_second_load_succeeds() {
    let backend = MockBackend {
        fail_loads: 1,
        ..MockBackend::new()
    };
    let (manager, loads) = manager_with(backend, Duration::from_secs(300));

    assert!(manager
        .transcribe(Path::new("audio.wav"), &TranscribeOptions::default())
        .await
        .is_err());
    assert!(manager
        .transcribe(Path::new("audio.wav"), &TranscribeOptions::default())
        .await
        .is_ok());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn given_inference_in_flight_when_unloading_then_busy() {
    let backend = MockBackend {
        inference_delay: Duration::from_millis(300),
        ..MockBackend::new()
    };
    let (manager, _) = manager_with(backend, Duration::from_secs(300));

    let inflight = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .transcribe(Path::new("audio.wav"), &TranscribeOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(manager.status().state, ModelState::Busy);
    assert!(matches!(manager.unload(), Err(ModelManagerError::Busy)));

    inflight.await.unwrap().expect("inference should finish");
    manager.unload().expect("idle slot should unload");
    assert_eq!(manager.status().state, ModelState::Unloaded);
}

#[tokio::test]
async fn given_unloaded_manager_when_unloading_then_idempotent() {
    let (manager, _) = manager_with(MockBackend::new(), Duration::from_secs(300));
    manager.unload().expect("first unload is a no-op");
    manager.unload().expect("second unload is a no-op");
    assert_eq!(manager.status().state, ModelState::Unloaded);
}

#[tokio::test]
async fn given_explicit_load_when_loading_twice_then_single_backend_load() {
    let (manager, loads) = manager_with(MockBackend::new(), Duration::from_secs(300));
    manager.load().await.unwrap();
    manager.load().await.unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(manager.status().state, ModelState::Ready);
}

#[tokio::test]
async fn given_idle_threshold_elapsed_when_watcher_ticks_then_model_is_released() {
    let (manager, _) = manager_with(MockBackend::new(), Duration::from_millis(200));
    let watcher = spawn_idle_watcher(&manager);

    manager
        .transcribe(Path::new("audio.wav"), &TranscribeOptions::default())
        .await
        .unwrap();
    assert_eq!(manager.status().state, ModelState::Ready);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(manager.status().state, ModelState::Unloaded);

    drop(manager);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(watcher.is_finished(), "watcher should stop with the manager");
}
