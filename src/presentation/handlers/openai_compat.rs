use std::path::Path;

use axum::extract::{Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::application::services::TerminalEvent;
use crate::domain::{Job, JobId, OutputFormat, SourceKind, TranscribeTask, Transcript};
use crate::presentation::state::AppState;

use super::jobs::{admit_job, stage_upload};
use super::openai_types::{
    CompatErrorResponse, ModelsResponse, ResponseFormat, TranscriptionResponse,
    TranscriptionVerboseResponse, VerboseSegment,
};

const ALLOWED_EXTENSIONS: [&str; 9] = [
    "mp3", "mp4", "mpeg", "mpga", "m4a", "wav", "webm", "flac", "ogg",
];

fn compat_error(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    (status, Json(CompatErrorResponse::new(kind, message))).into_response()
}

struct CompatRequest {
    job: Job,
    response_format: ResponseFormat,
    temperature: f32,
}

/// Parse the multipart request and stage the audio into a transient job.
/// Shared by transcriptions and translations, which differ only in task.
async fn parse_request(
    state: &AppState,
    multipart: &mut Multipart,
    task: TranscribeTask,
) -> Result<CompatRequest, Response> {
    let id = JobId::generate();
    let mut filename: Option<String> = None;
    let mut language: Option<String> = None;
    let mut prompt: Option<String> = None;
    let mut response_format = ResponseFormat::Json;
    let mut temperature = 0.0f32;

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                let _ = state.workspace.remove(&id).await;
                return Err(compat_error(
                    StatusCode::BAD_REQUEST,
                    "invalid_request_error",
                    format!("malformed multipart: {}", e),
                ));
            }
        };
        match field.name().unwrap_or("") {
            "file" => {
                let name = field.file_name().unwrap_or("").to_string();
                let extension = Path::new(&name)
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
                    return Err(compat_error(
                        StatusCode::BAD_REQUEST,
                        "invalid_request_error",
                        format!(
                            "invalid file type '{}'; allowed: {}",
                            extension,
                            ALLOWED_EXTENSIONS.join(", ")
                        ),
                    ));
                }
                if let Err(e) = stage_upload(state, &id, &mut field).await {
                    return Err(compat_error(
                        e.status,
                        e.info.kind.as_str(),
                        e.info.message,
                    ));
                }
                filename = Some(name);
            }
            "language" => {
                language = read_text(state, &id, field).await?.into();
            }
            "prompt" => {
                prompt = read_text(state, &id, field).await?.into();
            }
            "response_format" => {
                let raw = read_text(state, &id, field).await?;
                response_format = match raw.parse() {
                    Ok(format) => format,
                    Err(e) => {
                        let _ = state.workspace.remove(&id).await;
                        return Err(compat_error(
                            StatusCode::BAD_REQUEST,
                            "invalid_request_error",
                            e,
                        ));
                    }
                };
            }
            "temperature" => {
                let raw = read_text(state, &id, field).await?;
                temperature = raw.parse().unwrap_or(0.0);
            }
            // The model field is accepted and ignored; the server always
            // runs its configured model.
            "model" => {
                let _ = read_text(state, &id, field).await?;
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown form field");
            }
        }
    }

    let Some(filename) = filename else {
        let _ = state.workspace.remove(&id).await;
        return Err(compat_error(
            StatusCode::BAD_REQUEST,
            "invalid_request_error",
            "no file provided",
        ));
    };

    let mut job = Job::new(
        SourceKind::Upload,
        filename,
        None,
        state.settings.job_retention_days,
    );
    job.id = id;
    job.task = task;
    job.language = match task {
        // Translation auto-detects the source language unless one is given.
        TranscribeTask::Translate => language.filter(|l| !l.is_empty()),
        TranscribeTask::Transcribe => {
            Some(language.filter(|l| !l.is_empty()).unwrap_or_else(|| "ja".to_string()))
        }
    };
    job.initial_prompt = prompt.filter(|p| !p.is_empty());

    Ok(CompatRequest {
        job,
        response_format,
        temperature,
    })
}

async fn read_text(
    state: &AppState,
    id: &JobId,
    field: axum::extract::multipart::Field<'_>,
) -> Result<String, Response> {
    match field.text().await {
        Ok(text) => Ok(text),
        Err(e) => {
            let _ = state.workspace.remove(id).await;
            Err(compat_error(
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                format!("unreadable form field: {}", e),
            ))
        }
    }
}

/// Run the shared pipeline synchronously: enqueue, await the terminal
/// signal, read the artifact back. On timeout the job keeps running; only
/// the response is lost.
async fn run_inline(state: &AppState, request: CompatRequest) -> Response {
    let job = request.job;
    let receiver = state.completions.subscribe(&job.id);

    if let Err(e) = state.workspace.create_layout(&job.id).await {
        let _ = state.workspace.remove(&job.id).await;
        return compat_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "api_error",
            format!("workspace setup failed: {}", e),
        );
    }
    if let Err(e) = admit_job(state, &job).await {
        let _ = state.workspace.remove(&job.id).await;
        return compat_error(e.status, e.info.kind.as_str(), e.info.message);
    }

    let event = match tokio::time::timeout(state.settings.sync_request_timeout(), receiver).await
    {
        Ok(Ok(event)) => event,
        Ok(Err(_)) => {
            return compat_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                "pipeline shut down before the job finished",
            );
        }
        Err(_) => {
            tracing::warn!(job_id = %job.id, "Synchronous request timed out; job continues");
            return compat_error(
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "transcription did not finish within the request deadline",
            );
        }
    };

    if event == TerminalEvent::Failed {
        let (kind, message) = match state.repository.get(&job.id).await {
            Ok(Some(failed)) => failed
                .error
                .map(|e| (e.kind.as_str().to_string(), e.message))
                .unwrap_or_else(|| ("api_error".to_string(), "job failed".to_string())),
            _ => ("api_error".to_string(), "job failed".to_string()),
        };
        return compat_error(StatusCode::INTERNAL_SERVER_ERROR, &kind, message);
    }

    let transcript_path = state.workspace.artifact_path(&job.id, OutputFormat::Json);
    let transcript: Transcript = match tokio::fs::read(&transcript_path).await {
        Ok(bytes) => match serde_json::from_slice(&bytes) {
            Ok(t) => t,
            Err(e) => {
                return compat_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "api_error",
                    format!("transcript unreadable: {}", e),
                );
            }
        },
        Err(e) => {
            return compat_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "api_error",
                format!("transcript missing: {}", e),
            );
        }
    };

    render_response(&transcript, request.response_format, request.temperature, job.task)
}

fn render_response(
    transcript: &Transcript,
    format: ResponseFormat,
    temperature: f32,
    task: TranscribeTask,
) -> Response {
    use crate::application::services::{render_srt, render_vtt};

    match format {
        ResponseFormat::Json => Json(TranscriptionResponse {
            text: transcript.text.clone(),
        })
        .into_response(),
        ResponseFormat::Text => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            transcript.text.clone(),
        )
            .into_response(),
        ResponseFormat::Srt => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            render_srt(transcript),
        )
            .into_response(),
        ResponseFormat::Vtt => (
            [(header::CONTENT_TYPE, "text/vtt; charset=utf-8")],
            render_vtt(transcript),
        )
            .into_response(),
        ResponseFormat::VerboseJson => {
            let segments = transcript
                .segments
                .iter()
                .map(|s| VerboseSegment {
                    id: s.id,
                    seek: 0,
                    start: s.start,
                    end: s.end,
                    text: s.text.clone(),
                    tokens: Vec::new(),
                    temperature,
                    avg_logprob: 0.0,
                    compression_ratio: 0.0,
                    no_speech_prob: 0.0,
                })
                .collect();
            Json(TranscriptionVerboseResponse {
                task: match task {
                    TranscribeTask::Transcribe => "transcribe",
                    TranscribeTask::Translate => "translate",
                },
                language: transcript.language.clone(),
                duration: transcript.duration,
                text: transcript.text.clone(),
                segments,
            })
            .into_response()
        }
    }
}

/// `POST /v1/audio/transcriptions`
#[tracing::instrument(skip(state, multipart))]
pub async fn transcriptions_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    match parse_request(&state, &mut multipart, TranscribeTask::Transcribe).await {
        Ok(request) => run_inline(&state, request).await,
        Err(response) => response,
    }
}

/// `POST /v1/audio/translations` — same pipeline, decode constrained to
/// English output.
#[tracing::instrument(skip(state, multipart))]
pub async fn translations_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Response {
    match parse_request(&state, &mut multipart, TranscribeTask::Translate).await {
        Ok(request) => run_inline(&state, request).await,
        Err(response) => response,
    }
}

/// `GET /v1/audio/models`
pub async fn audio_models_handler(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse::with_models(&state.settings.whisper_model))
}
