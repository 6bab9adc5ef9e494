use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path as StorePath;
use object_store::{MultipartUpload, ObjectStore, PutPayload};
use tokio::io::AsyncWriteExt;

use crate::domain::{JobId, OutputFormat};

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("upload exceeds the configured size limit")]
    TooLarge,
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Owns the per-job directory layout under `{data_root}/jobs/{job_id}/`:
///
/// ```text
/// input/source.{ext}    original media
/// input/audio.wav       canonical 16 kHz mono PCM
/// output/…              transcript.json and derived artifacts
/// logs/process.log      per-job processing log
/// ```
///
/// Uploads stream through an `object_store` multipart writer so the request
/// body never sits in memory.
pub struct JobWorkspace {
    root: PathBuf,
    staging: Arc<LocalFileSystem>,
}

impl JobWorkspace {
    pub fn new(data_root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = data_root.into();
        std::fs::create_dir_all(root.join("jobs"))?;
        let staging = LocalFileSystem::new_with_prefix(&root)
            .map_err(|e| WorkspaceError::UploadFailed(e.to_string()))?;
        Ok(Self {
            root,
            staging: Arc::new(staging),
        })
    }

    pub fn job_dir(&self, id: &JobId) -> PathBuf {
        self.root.join("jobs").join(id.as_str())
    }

    pub fn exists(&self, id: &JobId) -> bool {
        self.job_dir(id).is_dir()
    }

    pub async fn create_layout(&self, id: &JobId) -> Result<(), WorkspaceError> {
        let dir = self.job_dir(id);
        for sub in ["input", "output", "logs"] {
            tokio::fs::create_dir_all(dir.join(sub)).await?;
        }
        Ok(())
    }

    pub fn input_dir(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join("input")
    }

    pub fn output_dir(&self, id: &JobId) -> PathBuf {
        self.job_dir(id).join("output")
    }

    pub fn audio_path(&self, id: &JobId) -> PathBuf {
        self.input_dir(id).join("audio.wav")
    }

    pub fn artifact_path(&self, id: &JobId, format: OutputFormat) -> PathBuf {
        self.output_dir(id).join(format.file_name())
    }

    /// Locate `input/source.{ext}` regardless of extension.
    pub async fn source_path(&self, id: &JobId) -> Option<PathBuf> {
        let mut entries = tokio::fs::read_dir(self.input_dir(id)).await.ok()?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("source.") {
                return Some(entry.path());
            }
        }
        None
    }

    /// Stream an upload into `input/source.{ext}`, enforcing `max_bytes`
    /// mid-stream. On overflow the partial upload is aborted and the error
    /// is returned before any row exists for the caller to observe.
    pub async fn store_upload(
        &self,
        id: &JobId,
        extension: &str,
        mut stream: BoxStream<'_, Result<Bytes, io::Error>>,
        max_bytes: u64,
    ) -> Result<u64, WorkspaceError> {
        let ext = sanitize_extension(extension);
        let store_path = StorePath::from(format!("jobs/{}/input/source.{}", id, ext));
        let mut upload = self
            .staging
            .put_multipart(&store_path)
            .await
            .map_err(|e| WorkspaceError::UploadFailed(e.to_string()))?;

        let mut total: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    let _ = upload.abort().await;
                    return Err(WorkspaceError::Io(e));
                }
            };
            total += bytes.len() as u64;
            if total > max_bytes {
                let _ = upload.abort().await;
                return Err(WorkspaceError::TooLarge);
            }
            if let Err(e) = upload.put_part(PutPayload::from(bytes)).await {
                let _ = upload.abort().await;
                return Err(WorkspaceError::UploadFailed(e.to_string()));
            }
        }

        upload
            .complete()
            .await
            .map_err(|e| WorkspaceError::UploadFailed(e.to_string()))?;

        Ok(total)
    }

    /// Append one timestamped line to the job's `logs/process.log`.
    pub async fn append_log(&self, id: &JobId, line: &str) -> Result<(), WorkspaceError> {
        let path = self.job_dir(id).join("logs").join("process.log");
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let entry = format!("{} {}\n", Utc::now().to_rfc3339(), line);
        file.write_all(entry.as_bytes()).await?;
        Ok(())
    }

    pub async fn delete_audio(&self, id: &JobId) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_file(self.audio_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_source(&self, id: &JobId) -> Result<(), WorkspaceError> {
        if let Some(path) = self.source_path(id).await {
            tokio::fs::remove_file(path).await?;
        }
        Ok(())
    }

    /// Tear down the whole job directory. Tolerant of prior partial
    /// deletions.
    pub async fn remove(&self, id: &JobId) -> Result<(), WorkspaceError> {
        match tokio::fs::remove_dir_all(self.job_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keep extensions filesystem-safe: short, lowercase, alphanumeric.
fn sanitize_extension(ext: &str) -> String {
    let cleaned: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();
    if cleaned.is_empty() {
        "bin".to_string()
    } else {
        cleaned
    }
}
