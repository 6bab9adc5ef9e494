use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Result of fetching remote media into a job's input directory.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub path: PathBuf,
    /// Duration reported by the fetcher's metadata, when available.
    pub duration_hint: Option<f64>,
}

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Download the media at `url` into `dest_dir` as `source.{ext}`.
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchedMedia, FetchError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("download failed: {0}")]
    DownloadFailed(String),
    #[error("downloaded file missing or empty")]
    EmptyOutput,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
