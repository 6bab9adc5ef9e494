use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::application::services::{ModelStatus, QueueStatus};
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct GpuStatus {
    pub present: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: ModelStatus,
    pub queue: QueueStatus,
    pub gpu: GpuStatus,
}

/// Liveness plus the operational snapshot: model slot, queue, GPU.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.models.status(),
        queue: state.processor.queue_status(),
        gpu: GpuStatus {
            present: state.models.gpu_available(),
        },
    })
}
