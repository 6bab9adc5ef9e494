use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use kikitori::application::services::{
    spawn_idle_watcher, run_startup_recovery, CompletionHub, JobProcessor, ModelManager,
    RetentionSweeper, StageTimeouts, Transcriber, WebhookNotifier,
};
use kikitori::infrastructure::media::{FfmpegExtractor, YtDlpFetcher};
use kikitori::infrastructure::model::{resolve_model_path, WhisperCppBackend};
use kikitori::infrastructure::observability::{init_tracing, TracingConfig};
use kikitori::infrastructure::persistence::{init_pool, SqliteJobRepository};
use kikitori::infrastructure::storage::JobWorkspace;
use kikitori::presentation::{create_router, AppState, Settings};

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    init_tracing(TracingConfig::default(), settings.port);

    tracing::info!(
        model = %settings.whisper_model,
        data_dir = %settings.data_dir.display(),
        retention_days = settings.job_retention_days,
        "Starting transcription service"
    );

    let pool = init_pool(&settings.data_dir.join("jobs.db")).await?;
    let repository = Arc::new(SqliteJobRepository::new(pool));
    let workspace = Arc::new(JobWorkspace::new(&settings.data_dir)?);

    let model_path = resolve_model_path(&settings.data_dir, &settings.whisper_model);
    let backend = Arc::new(WhisperCppBackend::new(
        model_path,
        settings.whisper_model.clone(),
        settings.whisper_threads,
    ));
    let models = Arc::new(ModelManager::new(
        backend,
        settings.idle_unload(),
        Duration::from_secs(settings.model_load_timeout_secs),
    ));
    spawn_idle_watcher(&models);

    let completions = Arc::new(CompletionHub::new());
    let notifier = Arc::new(WebhookNotifier::new());
    let timeouts = StageTimeouts {
        download: Duration::from_secs(settings.download_timeout_secs),
        extract: Duration::from_secs(settings.extract_timeout_secs),
        transcribe: Duration::from_secs(settings.transcribe_timeout_secs),
    };
    let (processor, handle) = JobProcessor::new(
        settings.queue_capacity,
        repository.clone(),
        workspace.clone(),
        Arc::new(YtDlpFetcher::new(settings.max_upload_size_mb)),
        Arc::new(FfmpegExtractor::new()),
        Transcriber::new(models.clone()),
        notifier,
        completions.clone(),
        timeouts,
        settings.keep_source,
    );

    run_startup_recovery(repository.clone(), workspace.clone(), handle.clone()).await?;
    tokio::spawn(processor.run());

    let sweeper = Arc::new(RetentionSweeper::new(
        repository.clone(),
        workspace.clone(),
        SWEEP_INTERVAL,
    ));
    tokio::spawn(Arc::clone(&sweeper).run());

    let state = AppState {
        settings: Arc::new(settings.clone()),
        repository,
        workspace,
        processor: handle,
        models,
        completions,
        sweeper,
    };

    let router = create_router(state);
    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
