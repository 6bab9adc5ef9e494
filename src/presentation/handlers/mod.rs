mod admin;
mod auth;
mod error;
mod health;
mod jobs;
mod openai_compat;
mod openai_types;

pub use admin::{
    admin_cleanup_handler, admin_model_load_handler, admin_model_unload_handler,
    admin_stats_handler,
};
pub use error::ApiError;
pub use health::health_handler;
pub use jobs::{
    create_job_handler, delete_job_handler, download_handler, get_job_handler, list_jobs_handler,
};
pub use openai_compat::{audio_models_handler, transcriptions_handler, translations_handler};
