use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::infrastructure::observability::request_id_middleware;
use crate::presentation::handlers::{
    admin_cleanup_handler, admin_model_load_handler, admin_model_unload_handler,
    admin_stats_handler, audio_models_handler, create_job_handler, delete_job_handler,
    download_handler, get_job_handler, health_handler, list_jobs_handler,
    transcriptions_handler, translations_handler,
};
use crate::presentation::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/jobs", post(create_job_handler).get(list_jobs_handler))
        .route(
            "/api/jobs/{job_id}",
            get(get_job_handler).delete(delete_job_handler),
        )
        .route("/api/jobs/{job_id}/download", get(download_handler))
        .route("/api/admin/stats", get(admin_stats_handler))
        .route("/api/admin/cleanup", post(admin_cleanup_handler))
        .route("/api/admin/model/load", post(admin_model_load_handler))
        .route("/api/admin/model/unload", post(admin_model_unload_handler))
        .route("/v1/audio/transcriptions", post(transcriptions_handler))
        .route("/v1/audio/translations", post(translations_handler))
        .route("/v1/audio/models", get(audio_models_handler))
        // Upload caps are enforced mid-stream against MAX_UPLOAD_SIZE_MB,
        // not by the framework's default 2 MB body limit.
        .layer(DefaultBodyLimit::disable())
        .layer(middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
