use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;

use crate::application::services::{ModelManagerError, ModelStatus, QueueStatus};
use crate::domain::{ErrorInfo, ErrorKind};
use crate::presentation::state::AppState;

use super::auth::require_admin;
use super::ApiError;

#[derive(Serialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub status_counts: BTreeMap<String, i64>,
    pub queue: QueueStatus,
    pub model: ModelStatus,
}

pub async fn admin_stats_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<StatsResponse>, ApiError> {
    require_admin(&state.settings, &headers)?;

    let counts = state.repository.count_by_status().await?;
    let total_jobs = counts.iter().map(|(_, n)| n).sum();
    let status_counts = counts
        .into_iter()
        .map(|(status, n)| (status.as_str().to_string(), n))
        .collect();

    Ok(Json(StatsResponse {
        total_jobs,
        status_counts,
        queue: state.processor.queue_status(),
        model: state.models.status(),
    }))
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

pub async fn admin_model_load_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    require_admin(&state.settings, &headers)?;

    state.models.load().await.map_err(|e| {
        ApiError::from_info(
            ErrorInfo::new(ErrorKind::ModelUnavailable, "model load failed")
                .with_details(e.to_string()),
        )
    })?;
    tracing::info!("Model loaded via admin API");
    Ok(Json(MessageResponse {
        message: "model loaded".to_string(),
    }))
}

pub async fn admin_model_unload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MessageResponse>, ApiError> {
    require_admin(&state.settings, &headers)?;

    match state.models.unload() {
        Ok(()) => {
            tracing::info!("Model unloaded via admin API");
            Ok(Json(MessageResponse {
                message: "model unloaded".to_string(),
            }))
        }
        Err(ModelManagerError::Busy) => Err(ApiError::new(
            StatusCode::CONFLICT,
            ErrorInfo::new(ErrorKind::InternalError, "model is busy"),
        )),
        Err(e) => Err(ApiError::internal(e.to_string())),
    }
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted_count: usize,
}

/// Forced retention sweep, same pass the background task runs on its
/// interval.
pub async fn admin_cleanup_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, ApiError> {
    require_admin(&state.settings, &headers)?;

    let deleted_count = state.sweeper.sweep_once().await;
    tracing::info!(deleted_count, "Forced cleanup finished");
    Ok(Json(CleanupResponse { deleted_count }))
}
