use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use kikitori::application::ports::{
    AudioExtractor, ExtractError, ExtractedAudio, FetchError, FetchedMedia, JobRepository,
    LoadedSpeechModel, MediaFetcher, SpeechBackend, SpeechModelError, TranscribeOptions,
};
use kikitori::application::services::{
    CompletionHub, JobProcessor, ModelManager, ProcessorHandle, StageTimeouts, TerminalEvent,
    Transcriber, WebhookNotifier,
};
use kikitori::domain::{
    ErrorKind, Job, JobStatus, OutputFormat, Segment, SourceKind, Transcript,
};
use kikitori::infrastructure::persistence::{init_pool, SqliteJobRepository};
use kikitori::infrastructure::storage::JobWorkspace;

struct MockFetcher {
    fail: bool,
}

#[async_trait]
impl MediaFetcher for MockFetcher {
    async fn fetch(&self, _url: &str, dest_dir: &Path) -> Result<FetchedMedia, FetchError> {
        if self.fail {
            return Err(FetchError::DownloadFailed("HTTP 403 Forbidden".into()));
        }
        let path = dest_dir.join("source.mp4");
        tokio::fs::write(&path, b"fake container").await?;
        Ok(FetchedMedia {
            path,
            duration_hint: None,
        })
    }
}

struct MockExtractor {
    duration: f64,
    gate: Option<Arc<tokio::sync::Semaphore>>,
    delay: Duration,
}

impl MockExtractor {
    fn instant(duration: f64) -> Self {
        Self {
            duration,
            gate: None,
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl AudioExtractor for MockExtractor {
    async fn extract(
        &self,
        source: &Path,
        dest: &Path,
    ) -> Result<ExtractedAudio, ExtractError> {
        if !source.is_file() {
            return Err(ExtractError::SourceMissing(source.display().to_string()));
        }
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.map_err(|_| {
                ExtractError::ConversionFailed("gate closed".into())
            })?;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        tokio::fs::write(dest, b"fake pcm").await?;
        Ok(ExtractedAudio {
            path: dest.to_path_buf(),
            duration_seconds: self.duration,
        })
    }
}

struct MockBackend;

struct MockModel;

#[async_trait]
impl LoadedSpeechModel for MockModel {
    async fn transcribe(
        &self,
        _audio_path: &Path,
        options: &TranscribeOptions,
    ) -> Result<Transcript, SpeechModelError> {
        let language = options.language.clone().unwrap_or_else(|| "ja".to_string());
        Ok(Transcript::from_segments(
            language,
            3.2,
            vec![
                Segment {
                    id: 0,
                    start: 0.0,
                    end: 1.5,
                    text: "こんにちは".to_string(),
                },
                Segment {
                    id: 1,
                    start: 1.5,
                    end: 3.2,
                    text: "テストです".to_string(),
                },
            ],
        ))
    }
}

#[async_trait]
impl SpeechBackend for MockBackend {
    async fn load(&self) -> Result<Box<dyn LoadedSpeechModel>, SpeechModelError> {
        Ok(Box::new(MockModel))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }

    fn gpu_available(&self) -> bool {
        false
    }
}

struct Harness {
    _dir: tempfile::TempDir,
    repository: Arc<SqliteJobRepository>,
    workspace: Arc<JobWorkspace>,
    handle: ProcessorHandle,
    completions: Arc<CompletionHub>,
}

async fn start_pipeline(
    fetcher: MockFetcher,
    extractor: MockExtractor,
    queue_capacity: usize,
    timeouts: StageTimeouts,
) -> Harness {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = init_pool(&dir.path().join("jobs.db")).await.unwrap();
    let repository = Arc::new(SqliteJobRepository::new(pool));
    let workspace = Arc::new(JobWorkspace::new(dir.path()).unwrap());
    let models = Arc::new(ModelManager::new(
        Arc::new(MockBackend),
        Duration::from_secs(300),
        Duration::from_secs(5),
    ));
    let completions = Arc::new(CompletionHub::new());

    let (processor, handle) = JobProcessor::new(
        queue_capacity,
        repository.clone() as Arc<dyn JobRepository>,
        workspace.clone(),
        Arc::new(fetcher),
        Arc::new(extractor),
        Transcriber::new(models),
        Arc::new(WebhookNotifier::new()),
        completions.clone(),
        timeouts,
        false,
    );
    tokio::spawn(processor.run());

    Harness {
        _dir: dir,
        repository,
        workspace,
        handle,
        completions,
    }
}

fn generous_timeouts() -> StageTimeouts {
    StageTimeouts {
        download: Duration::from_secs(5),
        extract: Duration::from_secs(5),
        transcribe: Duration::from_secs(5),
    }
}

async fn submit_upload_job(harness: &Harness, webhook_url: Option<String>) -> Job {
    let mut job = Job::new(SourceKind::Upload, "clip.wav", webhook_url, 7);
    job.id = kikitori::domain::JobId::generate();
    harness.workspace.create_layout(&job.id).await.unwrap();
    tokio::fs::write(
        harness.workspace.input_dir(&job.id).join("source.wav"),
        b"fake upload",
    )
    .await
    .unwrap();
    harness.repository.insert(&job).await.unwrap();
    job
}

async fn run_to_terminal(harness: &Harness, job: &Job) -> TerminalEvent {
    let receiver = harness.completions.subscribe(&job.id);
    harness.handle.try_enqueue(job.id.clone()).unwrap();
    tokio::time::timeout(Duration::from_secs(10), receiver)
        .await
        .expect("pipeline should reach a terminal state")
        .expect("completion signal should arrive")
}

/// Local webhook sink that records hits and answers with a fixed status.
async fn start_webhook_sink(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let recorded = hits.clone();
    let app = Router::new().route(
        "/hook",
        post(move || {
            let recorded = recorded.clone();
            async move {
                recorded.fetch_add(1, Ordering::SeqCst);
                status
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}/hook", addr), hits)
}

#[tokio::test]
async fn given_uploaded_source_when_processing_then_job_completes_with_all_artifacts() {
    let harness = start_pipeline(
        MockFetcher { fail: false },
        MockExtractor::instant(42.0),
        8,
        generous_timeouts(),
    )
    .await;
    let job = submit_upload_job(&harness, None).await;

    let event = run_to_terminal(&harness, &job).await;
    assert_eq!(event, TerminalEvent::Completed);

    let row = harness.repository.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed);
    assert_eq!(row.progress, 100);
    assert_eq!(row.duration_seconds, Some(42.0));
    assert_eq!(row.result_formats.len(), 5);
    assert!(row.completed_at.is_some());

    // Exactly the advertised artifacts plus the canonical transcript.
    for format in OutputFormat::ALL {
        assert!(
            harness.workspace.artifact_path(&job.id, format).is_file(),
            "{} missing",
            format
        );
    }
    // Intermediate audio and (by configuration) the source are gone.
    assert!(!harness.workspace.audio_path(&job.id).is_file());
    assert!(harness.workspace.source_path(&job.id).await.is_none());

    let log = tokio::fs::read_to_string(
        harness.workspace.job_dir(&job.id).join("logs/process.log"),
    )
    .await
    .unwrap();
    assert!(log.contains("job completed"));
}

#[tokio::test]
async fn given_failing_download_when_processing_then_job_fails_and_webhook_fires() {
    let (hook_url, hits) = start_webhook_sink(StatusCode::OK).await;
    let harness = start_pipeline(
        MockFetcher { fail: true },
        MockExtractor::instant(1.0),
        8,
        generous_timeouts(),
    )
    .await;

    let mut job = Job::new(
        SourceKind::Url,
        "https://example.invalid/clip.mp4",
        Some(hook_url),
        7,
    );
    job.id = kikitori::domain::JobId::generate();
    harness.workspace.create_layout(&job.id).await.unwrap();
    harness.repository.insert(&job).await.unwrap();

    let event = run_to_terminal(&harness, &job).await;
    assert_eq!(event, TerminalEvent::Failed);

    let row = harness.repository.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Failed);
    assert!(row.failed_at.is_some());
    let error = row.error.expect("error should be recorded");
    assert_eq!(error.kind, ErrorKind::DownloadError);
    assert!(error.details.unwrap().contains("403"));

    // The webhook task runs off the pipeline's critical path.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn given_webhook_that_always_fails_then_job_completion_is_unaffected() {
    let (hook_url, hits) = start_webhook_sink(StatusCode::INTERNAL_SERVER_ERROR).await;
    let harness = start_pipeline(
        MockFetcher { fail: false },
        MockExtractor::instant(5.0),
        8,
        generous_timeouts(),
    )
    .await;
    let job = submit_upload_job(&harness, Some(hook_url)).await;

    let event = run_to_terminal(&harness, &job).await;
    assert_eq!(event, TerminalEvent::Completed);

    // Three attempts with doubling backoff (1s + 2s), then exhaustion.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    let row = harness.repository.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.status, JobStatus::Completed, "status must not regress");

    let log = tokio::fs::read_to_string(
        harness.workspace.job_dir(&job.id).join("logs/process.log"),
    )
    .await
    .unwrap();
    assert!(log.contains("webhook delivery failed"));
}

#[tokio::test]
async fn given_slow_stage_when_budget_expires_then_job_fails_with_timeout() {
    let harness = start_pipeline(
        MockFetcher { fail: false },
        MockExtractor {
            duration: 1.0,
            gate: None,
            delay: Duration::from_millis(500),
        },
        8,
        StageTimeouts {
            download: Duration::from_secs(5),
            extract: Duration::from_millis(100),
            transcribe: Duration::from_secs(5),
        },
    )
    .await;
    let job = submit_upload_job(&harness, None).await;

    let event = run_to_terminal(&harness, &job).await;
    assert_eq!(event, TerminalEvent::Failed);

    let row = harness.repository.get(&job.id).await.unwrap().unwrap();
    assert_eq!(row.error.unwrap().kind, ErrorKind::Timeout);
}

#[tokio::test]
async fn given_saturated_queue_when_reserving_then_queue_full() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let harness = start_pipeline(
        MockFetcher { fail: false },
        MockExtractor {
            duration: 1.0,
            gate: Some(gate.clone()),
            delay: Duration::ZERO,
        },
        1,
        generous_timeouts(),
    )
    .await;

    // First job is dequeued and parks in the gated extractor; the second
    // fills the single queue slot.
    let first = submit_upload_job(&harness, None).await;
    let first_rx = harness.completions.subscribe(&first.id);
    harness.handle.try_enqueue(first.id.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let second = submit_upload_job(&harness, None).await;
    let second_rx = harness.completions.subscribe(&second.id);
    harness.handle.try_enqueue(second.id.clone()).unwrap();

    let rejected = harness.handle.reserve_slot();
    assert!(rejected.is_err(), "third admission must see a full queue");
    assert_eq!(
        rejected.err().map(|e| e.kind),
        Some(ErrorKind::QueueFull)
    );

    // Draining the gate lets both in-flight jobs finish normally.
    gate.add_permits(16);
    for (job, rx) in [(first, first_rx), (second, second_rx)] {
        let event = tokio::time::timeout(Duration::from_secs(10), rx)
            .await
            .expect("job should finish")
            .unwrap();
        assert_eq!(event, TerminalEvent::Completed, "{} should complete", job.id);
    }
}

#[tokio::test]
async fn given_job_deleted_mid_stage_then_worker_abandons_without_residue() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let harness = start_pipeline(
        MockFetcher { fail: false },
        MockExtractor {
            duration: 1.0,
            gate: Some(gate.clone()),
            delay: Duration::ZERO,
        },
        8,
        generous_timeouts(),
    )
    .await;

    let job = submit_upload_job(&harness, None).await;
    harness.handle.try_enqueue(job.id.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Cooperative cancellation: tear down directory and row while the
    // extractor subprocess stand-in is still running.
    harness.workspace.remove(&job.id).await.unwrap();
    harness.repository.delete(&job.id).await.unwrap();
    gate.add_permits(16);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(harness.repository.get(&job.id).await.unwrap().is_none());
    assert!(!harness.workspace.exists(&job.id));

    // The worker survives and processes the next job.
    let next = submit_upload_job(&harness, None).await;
    let event = run_to_terminal(&harness, &next).await;
    assert_eq!(event, TerminalEvent::Completed);
}

#[tokio::test]
async fn given_non_terminal_rows_on_startup_then_recovery_requeues_or_fails_them() {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = init_pool(&dir.path().join("jobs.db")).await.unwrap();
    let repository = Arc::new(SqliteJobRepository::new(pool));
    let workspace = Arc::new(JobWorkspace::new(dir.path()).unwrap());
    let models = Arc::new(ModelManager::new(
        Arc::new(MockBackend),
        Duration::from_secs(300),
        Duration::from_secs(5),
    ));
    let completions = Arc::new(CompletionHub::new());
    let (processor, handle) = JobProcessor::new(
        8,
        repository.clone() as Arc<dyn JobRepository>,
        workspace.clone(),
        Arc::new(MockFetcher { fail: false }),
        Arc::new(MockExtractor::instant(2.0)),
        Transcriber::new(models),
        Arc::new(WebhookNotifier::new()),
        completions.clone(),
        generous_timeouts(),
        false,
    );

    // One interrupted job with an intact directory, one whose directory is
    // gone.
    let mut resumable = Job::new(SourceKind::Upload, "a.wav", None, 7);
    resumable.id = kikitori::domain::JobId::generate();
    workspace.create_layout(&resumable.id).await.unwrap();
    tokio::fs::write(
        workspace.input_dir(&resumable.id).join("source.wav"),
        b"bytes",
    )
    .await
    .unwrap();
    repository.insert(&resumable).await.unwrap();
    repository
        .update_progress(
            &resumable.id,
            JobStatus::Extracting,
            JobStatus::Extracting.into(),
            25,
        )
        .await
        .unwrap();

    let mut stale = Job::new(SourceKind::Upload, "b.wav", None, 7);
    stale.id = kikitori::domain::JobId::generate();
    repository.insert(&stale).await.unwrap();

    let resumable_rx = completions.subscribe(&resumable.id);
    kikitori::application::services::run_startup_recovery(
        repository.clone() as Arc<dyn JobRepository>,
        workspace.clone(),
        handle.clone(),
    )
    .await
    .unwrap();
    tokio::spawn(processor.run());

    let event = tokio::time::timeout(Duration::from_secs(10), resumable_rx)
        .await
        .expect("resumed job should finish")
        .unwrap();
    assert_eq!(event, TerminalEvent::Completed);

    let stale_row = repository.get(&stale.id).await.unwrap().unwrap();
    assert_eq!(stale_row.status, JobStatus::Failed);
    assert_eq!(stale_row.error.unwrap().kind, ErrorKind::StaleStorage);
}
