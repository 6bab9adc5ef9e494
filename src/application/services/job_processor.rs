use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use crate::application::ports::{
    AudioExtractor, JobRepository, MediaFetcher, RepositoryError, TranscribeOptions,
};
use crate::domain::{
    ErrorInfo, ErrorKind, Job, JobId, JobStatus, OutputFormat, SourceKind, TranscribeTask,
};
use crate::infrastructure::storage::JobWorkspace;

use super::completion::CompletionHub;
use super::output_formatter::OutputFormatter;
use super::transcriber::{Transcriber, TranscriberError};
use super::webhook_notifier::WebhookNotifier;

/// Soft per-stage budgets; a stage that overruns fails with `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub download: Duration,
    pub extract: Duration,
    pub transcribe: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub depth: usize,
    pub capacity: usize,
    pub current_job: Option<String>,
}

/// Producer-side handle: non-blocking admission plus queue introspection.
#[derive(Clone)]
pub struct ProcessorHandle {
    sender: mpsc::Sender<JobId>,
    current: watch::Receiver<Option<String>>,
}

/// A reserved queue slot. Admission reserves before writing the job row so
/// a saturated queue rejects the request while the store is still clean.
pub struct AdmissionSlot<'a> {
    permit: mpsc::Permit<'a, JobId>,
}

impl AdmissionSlot<'_> {
    pub fn send(self, id: JobId) {
        self.permit.send(id);
    }
}

impl ProcessorHandle {
    /// Enqueue without blocking; a saturated queue is the caller's signal
    /// to reject admission.
    pub fn try_enqueue(&self, id: JobId) -> Result<(), ErrorInfo> {
        self.sender.try_send(id).map_err(|_| {
            ErrorInfo::new(ErrorKind::QueueFull, "job queue is at capacity")
        })
    }

    /// Reserve a queue slot ahead of the row insert; dropping the slot
    /// releases it.
    pub fn reserve_slot(&self) -> Result<AdmissionSlot<'_>, ErrorInfo> {
        let permit = self.sender.try_reserve().map_err(|_| {
            ErrorInfo::new(ErrorKind::QueueFull, "job queue is at capacity")
        })?;
        Ok(AdmissionSlot { permit })
    }

    pub fn queue_status(&self) -> QueueStatus {
        let capacity = self.sender.max_capacity();
        QueueStatus {
            depth: capacity - self.sender.capacity(),
            capacity,
            current_job: self.current.borrow().clone(),
        }
    }
}

enum PipelineOutcome {
    Completed {
        duration_seconds: Option<f64>,
        formats: Vec<OutputFormat>,
    },
    Failed(ErrorInfo),
    /// Row or directory vanished mid-run (cooperative cancellation); leave
    /// no further traces.
    Abandoned,
}

/// The single worker that drains the job queue and drives each job through
/// download, extraction, transcription, and formatting.
///
/// Every stage transition is committed to the store before the stage does
/// work, so a crash leaves a row that names the stage to resume from.
pub struct JobProcessor {
    receiver: mpsc::Receiver<JobId>,
    repository: Arc<dyn JobRepository>,
    workspace: Arc<JobWorkspace>,
    fetcher: Arc<dyn MediaFetcher>,
    extractor: Arc<dyn AudioExtractor>,
    transcriber: Transcriber,
    notifier: Arc<WebhookNotifier>,
    completions: Arc<CompletionHub>,
    timeouts: StageTimeouts,
    keep_source: bool,
    current: watch::Sender<Option<String>>,
}

impl JobProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue_capacity: usize,
        repository: Arc<dyn JobRepository>,
        workspace: Arc<JobWorkspace>,
        fetcher: Arc<dyn MediaFetcher>,
        extractor: Arc<dyn AudioExtractor>,
        transcriber: Transcriber,
        notifier: Arc<WebhookNotifier>,
        completions: Arc<CompletionHub>,
        timeouts: StageTimeouts,
        keep_source: bool,
    ) -> (Self, ProcessorHandle) {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let (current_tx, current_rx) = watch::channel(None);
        let processor = Self {
            receiver,
            repository,
            workspace,
            fetcher,
            extractor,
            transcriber,
            notifier,
            completions,
            timeouts,
            keep_source,
            current: current_tx,
        };
        let handle = ProcessorHandle {
            sender,
            current: current_rx,
        };
        (processor, handle)
    }

    pub async fn run(mut self) {
        tracing::info!("Job processor started");
        while let Some(id) = self.receiver.recv().await {
            self.current.send_replace(Some(id.as_str().to_string()));
            let span = tracing::info_span!("job", job_id = %id);
            let _guard = span.enter();
            if let Err(e) = self.process_job(&id).await {
                tracing::error!(error = %e, "Job processing aborted on store error");
            }
            drop(_guard);
            self.current.send_replace(None);
        }
        tracing::info!("Job processor stopped: queue closed");
    }

    async fn process_job(&self, id: &JobId) -> Result<(), RepositoryError> {
        let Some(job) = self.repository.get(id).await? else {
            tracing::debug!("Job row gone before start, skipping");
            return Ok(());
        };
        if job.is_terminal() {
            tracing::debug!(status = %job.status, "Job already terminal, skipping");
            return Ok(());
        }
        if !self.workspace.exists(id) {
            let error = ErrorInfo::new(
                ErrorKind::StaleStorage,
                "job directory is missing",
            );
            match self.repository.mark_failed(id, &error).await {
                Ok(()) => self.finish(id).await?,
                Err(RepositoryError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
            return Ok(());
        }

        let outcome = self.run_pipeline(&job).await;

        match outcome {
            Ok(PipelineOutcome::Completed {
                duration_seconds,
                formats,
            }) => {
                match self
                    .repository
                    .mark_completed(id, duration_seconds, &formats)
                    .await
                {
                    Ok(()) => {
                        self.log(id, "job completed").await;
                        tracing::info!("Job completed");
                        self.finish(id).await?;
                    }
                    // Deleted between the last stage and the terminal write.
                    Err(RepositoryError::NotFound(_)) => {
                        tracing::info!("Job abandoned: deleted before completion");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(PipelineOutcome::Failed(error)) => {
                match self.repository.mark_failed(id, &error).await {
                    Ok(()) => {
                        self.log(id, &format!("job failed: {}", error)).await;
                        tracing::warn!(kind = %error.kind, message = %error.message, "Job failed");
                        self.finish(id).await?;
                    }
                    Err(RepositoryError::NotFound(_)) => {
                        tracing::info!("Job abandoned: deleted before failure commit");
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(PipelineOutcome::Abandoned) => {
                tracing::info!("Job abandoned: deleted while processing");
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Reload the terminal row, notify synchronous waiters, and hand the
    /// terminal event to the webhook notifier without gating on it.
    async fn finish(&self, id: &JobId) -> Result<(), RepositoryError> {
        let Some(job) = self.repository.get(id).await? else {
            return Ok(());
        };
        self.completions.notify(id, job.status.into());

        if job.webhook_url.is_some() {
            let notifier = Arc::clone(&self.notifier);
            let workspace = Arc::clone(&self.workspace);
            tokio::spawn(async move {
                let id = job.id.clone();
                if let Err(e) = notifier.deliver(&job).await {
                    tracing::warn!(job_id = %id, error = %e, "Webhook delivery gave up");
                    if let Err(log_err) = workspace
                        .append_log(&id, &format!("webhook delivery failed: {}", e))
                        .await
                    {
                        tracing::debug!(error = %log_err, "Could not write process log");
                    }
                }
            });
        }
        Ok(())
    }

    async fn run_pipeline(&self, job: &Job) -> Result<PipelineOutcome, RepositoryError> {
        let id = &job.id;

        // Resumption: re-enter at the stage the row was committed to. Status
        // never moves backwards, so a resumed stage whose input artifact is
        // gone fails as stale storage instead of falling back.
        let entry = match job.status {
            JobStatus::Queued | JobStatus::Downloading => JobStatus::Downloading,
            JobStatus::Extracting => JobStatus::Extracting,
            JobStatus::Transcribing => JobStatus::Transcribing,
            JobStatus::Formatting => JobStatus::Formatting,
            JobStatus::Completed | JobStatus::Failed => return Ok(PipelineOutcome::Abandoned),
        };
        let prerequisite_missing = match entry {
            JobStatus::Extracting => self.workspace.source_path(id).await.is_none(),
            JobStatus::Transcribing => !self.workspace.audio_path(id).is_file(),
            JobStatus::Formatting => {
                !self.workspace.artifact_path(id, OutputFormat::Json).is_file()
            }
            _ => false,
        };
        if prerequisite_missing {
            return Ok(PipelineOutcome::Failed(ErrorInfo::new(
                ErrorKind::StaleStorage,
                format!("input artifact for the {} stage is missing", entry),
            )));
        }

        let order = stage_order(entry);

        if order <= stage_order(JobStatus::Downloading) {
            match self.stage_download(job).await? {
                StageResult::Done => {}
                StageResult::Abandoned => return Ok(PipelineOutcome::Abandoned),
                StageResult::Failed(e) => return Ok(PipelineOutcome::Failed(e)),
            }
        }

        let duration_seconds = if order <= stage_order(JobStatus::Extracting) {
            match self.stage_extract(job).await? {
                ExtractOutcome::Done(duration) => Some(duration),
                ExtractOutcome::Abandoned => return Ok(PipelineOutcome::Abandoned),
                ExtractOutcome::Failed(e) => return Ok(PipelineOutcome::Failed(e)),
            }
        } else {
            job.duration_seconds
        };

        if order <= stage_order(JobStatus::Transcribing) {
            match self.stage_transcribe(job).await? {
                StageResult::Done => {}
                StageResult::Abandoned => return Ok(PipelineOutcome::Abandoned),
                StageResult::Failed(e) => return Ok(PipelineOutcome::Failed(e)),
            }
        }

        match self.stage_format(job).await? {
            FormatOutcome::Done(formats) => Ok(PipelineOutcome::Completed {
                duration_seconds,
                formats,
            }),
            FormatOutcome::Abandoned => Ok(PipelineOutcome::Abandoned),
            FormatOutcome::Failed(e) => Ok(PipelineOutcome::Failed(e)),
        }
    }

    async fn stage_download(&self, job: &Job) -> Result<StageResult, RepositoryError> {
        let id = &job.id;
        match self.commit(id, JobStatus::Downloading, 0).await? {
            Commit::Ok => {}
            Commit::Gone => return Ok(StageResult::Abandoned),
        }
        self.log(id, "stage downloading started").await;

        if job.source_kind == SourceKind::Url {
            let dest = self.workspace.input_dir(id);
            let fetch = self.fetcher.fetch(&job.source_ref, &dest);
            match tokio::time::timeout(self.timeouts.download, fetch).await {
                Ok(Ok(media)) => {
                    tracing::info!(path = %media.path.display(), "Source fetched");
                }
                Ok(Err(e)) => {
                    return Ok(StageResult::Failed(
                        ErrorInfo::new(ErrorKind::DownloadError, "media download failed")
                            .with_details(e.to_string()),
                    ));
                }
                Err(_) => {
                    return Ok(StageResult::Failed(ErrorInfo::new(
                        ErrorKind::Timeout,
                        "download stage exceeded its budget",
                    )));
                }
            }
        } else if self.workspace.source_path(id).await.is_none() {
            return Ok(StageResult::Failed(ErrorInfo::new(
                ErrorKind::StaleStorage,
                "uploaded source is missing",
            )));
        }

        match self.commit(id, JobStatus::Downloading, 100).await? {
            Commit::Ok => Ok(StageResult::Done),
            Commit::Gone => Ok(StageResult::Abandoned),
        }
    }

    async fn stage_extract(&self, job: &Job) -> Result<ExtractOutcome, RepositoryError> {
        let id = &job.id;
        match self.commit(id, JobStatus::Extracting, 0).await? {
            Commit::Ok => {}
            Commit::Gone => return Ok(ExtractOutcome::Abandoned),
        }
        self.log(id, "stage extracting started").await;

        let Some(source) = self.workspace.source_path(id).await else {
            return Ok(ExtractOutcome::Failed(ErrorInfo::new(
                ErrorKind::StaleStorage,
                "source disappeared before extraction",
            )));
        };
        let dest = self.workspace.audio_path(id);
        let extract = self.extractor.extract(&source, &dest);
        let audio = match tokio::time::timeout(self.timeouts.extract, extract).await {
            Ok(Ok(audio)) => audio,
            Ok(Err(e)) => {
                return Ok(ExtractOutcome::Failed(
                    ErrorInfo::new(ErrorKind::ExtractError, "audio extraction failed")
                        .with_details(e.to_string()),
                ));
            }
            Err(_) => {
                return Ok(ExtractOutcome::Failed(ErrorInfo::new(
                    ErrorKind::Timeout,
                    "extract stage exceeded its budget",
                )));
            }
        };

        match self.repository.set_duration(id, audio.duration_seconds).await {
            Ok(()) => {}
            Err(RepositoryError::NotFound(_)) => return Ok(ExtractOutcome::Abandoned),
            Err(e) => return Err(e),
        }
        match self.commit(id, JobStatus::Extracting, 100).await? {
            Commit::Ok => Ok(ExtractOutcome::Done(audio.duration_seconds)),
            Commit::Gone => Ok(ExtractOutcome::Abandoned),
        }
    }

    async fn stage_transcribe(&self, job: &Job) -> Result<StageResult, RepositoryError> {
        let id = &job.id;
        match self.commit(id, JobStatus::Transcribing, 0).await? {
            Commit::Ok => {}
            Commit::Gone => return Ok(StageResult::Abandoned),
        }
        self.log(id, "stage transcribing started").await;

        let options = TranscribeOptions {
            language: match job.task {
                TranscribeTask::Translate => job.language.clone(),
                TranscribeTask::Transcribe => {
                    job.language.clone().or_else(|| Some("ja".to_string()))
                }
            },
            task: job.task,
            initial_prompt: job.initial_prompt.clone(),
            ..TranscribeOptions::default()
        };
        let audio = self.workspace.audio_path(id);
        let output = self.workspace.output_dir(id);
        let run = self.transcriber.run(&audio, &output, &options);
        match tokio::time::timeout(self.timeouts.transcribe, run).await {
            Ok(Ok(transcript)) => {
                tracing::info!(
                    segments = transcript.segment_count(),
                    duration = transcript.duration,
                    "Transcription finished"
                );
            }
            Ok(Err(TranscriberError::ModelUnavailable(msg))) => {
                return Ok(StageResult::Failed(
                    ErrorInfo::new(ErrorKind::ModelUnavailable, "transcription model unavailable")
                        .with_details(msg),
                ));
            }
            Ok(Err(e)) => {
                return Ok(StageResult::Failed(
                    ErrorInfo::new(ErrorKind::TranscriptionError, "transcription failed")
                        .with_details(e.to_string()),
                ));
            }
            Err(_) => {
                return Ok(StageResult::Failed(ErrorInfo::new(
                    ErrorKind::Timeout,
                    "transcribe stage exceeded its budget",
                )));
            }
        }

        match self.commit(id, JobStatus::Transcribing, 100).await? {
            Commit::Ok => Ok(StageResult::Done),
            Commit::Gone => Ok(StageResult::Abandoned),
        }
    }

    async fn stage_format(&self, job: &Job) -> Result<FormatOutcome, RepositoryError> {
        let id = &job.id;
        match self.commit(id, JobStatus::Formatting, 0).await? {
            Commit::Ok => {}
            Commit::Gone => return Ok(FormatOutcome::Abandoned),
        }
        self.log(id, "stage formatting started").await;

        let transcript_path = self.workspace.artifact_path(id, OutputFormat::Json);
        let transcript = match tokio::fs::read(&transcript_path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(t) => t,
                Err(e) => {
                    return Ok(FormatOutcome::Failed(
                        ErrorInfo::new(ErrorKind::FormatError, "transcript is unreadable")
                            .with_details(e.to_string()),
                    ));
                }
            },
            Err(e) => {
                return Ok(FormatOutcome::Failed(
                    ErrorInfo::new(ErrorKind::FormatError, "transcript is missing")
                        .with_details(e.to_string()),
                ));
            }
        };

        let formats = match OutputFormatter::write_all(&transcript, &self.workspace.output_dir(id))
            .await
        {
            Ok(formats) => formats,
            Err(e) => {
                return Ok(FormatOutcome::Failed(
                    ErrorInfo::new(ErrorKind::FormatError, "artifact write failed")
                        .with_details(e.to_string()),
                ));
            }
        };

        // Intermediate audio is no longer needed; the source is kept only
        // when configured.
        if let Err(e) = self.workspace.delete_audio(id).await {
            tracing::warn!(error = %e, "Could not remove intermediate audio");
        }
        if !self.keep_source {
            if let Err(e) = self.workspace.delete_source(id).await {
                tracing::warn!(error = %e, "Could not remove source media");
            }
        }

        match self.commit(id, JobStatus::Formatting, 100).await? {
            Commit::Ok => Ok(FormatOutcome::Done(formats)),
            Commit::Gone => Ok(FormatOutcome::Abandoned),
        }
    }

    /// Commit a stage transition before the stage runs. `Gone` means the
    /// job was deleted out from under us and the pipeline must abandon it.
    async fn commit(
        &self,
        id: &JobId,
        status: JobStatus,
        stage_percent: u8,
    ) -> Result<Commit, RepositoryError> {
        if !self.workspace.exists(id) {
            return Ok(Commit::Gone);
        }
        let progress = status.scale_progress(stage_percent);
        match self
            .repository
            .update_progress(id, status, status.into(), progress)
            .await
        {
            Ok(()) => Ok(Commit::Ok),
            Err(RepositoryError::NotFound(_)) => Ok(Commit::Gone),
            Err(RepositoryError::IllegalTransition { from, to, .. }) => {
                tracing::error!(from = %from, to = %to, "Illegal transition guard tripped");
                Err(RepositoryError::IllegalTransition {
                    job_id: id.as_str().to_string(),
                    from,
                    to,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn log(&self, id: &JobId, line: &str) {
        if let Err(e) = self.workspace.append_log(id, line).await {
            tracing::debug!(error = %e, "Could not write process log");
        }
    }
}

enum Commit {
    Ok,
    Gone,
}

enum StageResult {
    Done,
    Abandoned,
    Failed(ErrorInfo),
}

enum ExtractOutcome {
    Done(f64),
    Abandoned,
    Failed(ErrorInfo),
}

enum FormatOutcome {
    Done(Vec<OutputFormat>),
    Abandoned,
    Failed(ErrorInfo),
}

fn stage_order(status: JobStatus) -> u8 {
    match status {
        JobStatus::Queued => 0,
        JobStatus::Downloading => 1,
        JobStatus::Extracting => 2,
        JobStatus::Transcribing => 3,
        JobStatus::Formatting => 4,
        JobStatus::Completed => 5,
        JobStatus::Failed => 6,
    }
}

/// Startup sweep: rows left non-terminal by a previous process either lost
/// their directory (fail them as stale) or are re-queued for resumption
/// from their last committed stage.
pub async fn run_startup_recovery(
    repository: Arc<dyn JobRepository>,
    workspace: Arc<JobWorkspace>,
    handle: ProcessorHandle,
) -> Result<(), RepositoryError> {
    let pending = repository.non_terminal().await?;
    for job in pending {
        if !workspace.exists(&job.id) {
            let error = ErrorInfo::new(ErrorKind::StaleStorage, "job directory is missing");
            if let Err(e) = repository.mark_failed(&job.id, &error).await {
                tracing::warn!(job_id = %job.id, error = %e, "Could not mark stale job failed");
            } else {
                tracing::warn!(job_id = %job.id, "Marked stale job failed on startup");
            }
            continue;
        }
        match handle.try_enqueue(job.id.clone()) {
            Ok(()) => {
                tracing::info!(job_id = %job.id, status = %job.status, "Re-queued job for resumption")
            }
            Err(_) => {
                tracing::warn!(job_id = %job.id, "Queue full during recovery, job stays pending");
            }
        }
    }
    Ok(())
}
