mod audio_extractor;
mod job_repository;
mod media_fetcher;
mod repository_error;
mod speech_model;

pub use audio_extractor::{AudioExtractor, ExtractError, ExtractedAudio};
pub use job_repository::{JobFilter, JobRepository};
pub use media_fetcher::{FetchError, FetchedMedia, MediaFetcher};
pub use repository_error::RepositoryError;
pub use speech_model::{
    LoadedSpeechModel, SpeechBackend, SpeechModelError, TranscribeOptions,
};
