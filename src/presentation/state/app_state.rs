use std::sync::Arc;

use crate::application::ports::JobRepository;
use crate::application::services::{
    CompletionHub, ModelManager, ProcessorHandle, RetentionSweeper,
};
use crate::infrastructure::storage::JobWorkspace;
use crate::presentation::config::Settings;

/// Everything the request handlers share. Cheap to clone: all components
/// live behind `Arc`s owned by the composition root.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub repository: Arc<dyn JobRepository>,
    pub workspace: Arc<JobWorkspace>,
    pub processor: ProcessorHandle,
    pub models: Arc<ModelManager>,
    pub completions: Arc<CompletionHub>,
    pub sweeper: Arc<RetentionSweeper>,
}
