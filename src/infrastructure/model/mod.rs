mod whisper_backend;

pub use whisper_backend::{resolve_model_path, WhisperCppBackend};
