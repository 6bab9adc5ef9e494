use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use crate::application::ports::{FetchError, FetchedMedia, MediaFetcher};

const STDERR_LIMIT: usize = 500;

/// Fetches remote media through the external `yt-dlp` tool.
///
/// Downloads resume across retries (`--continue`), fragments download in
/// parallel, and the merged output is capped at 720p to keep extraction
/// fast; only the audio track survives the pipeline anyway.
pub struct YtDlpFetcher {
    binary: String,
    max_filesize_mb: u64,
}

impl YtDlpFetcher {
    pub fn new(max_filesize_mb: u64) -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            max_filesize_mb,
        }
    }
}

#[async_trait]
impl MediaFetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path) -> Result<FetchedMedia, FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://"))
            || url.chars().any(char::is_whitespace)
        {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let template = dest_dir.join("source.%(ext)s");
        let output = Command::new(&self.binary)
            .arg("--format")
            .arg("bestvideo[height<=720]+bestaudio/best[height<=720]/best")
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("--retries")
            .arg("10")
            .arg("--fragment-retries")
            .arg("10")
            .arg("--concurrent-fragments")
            .arg("4")
            .arg("--continue")
            .arg("--no-playlist")
            .arg("--no-progress")
            .arg("--max-filesize")
            .arg(format!("{}M", self.max_filesize_mb))
            .arg("--output")
            .arg(&template)
            .arg(url)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    FetchError::DownloadFailed("yt-dlp is not installed".to_string())
                } else {
                    FetchError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(FetchError::DownloadFailed(last_stderr_line(&output.stderr)));
        }

        // yt-dlp picks the extension; find whatever source.* it produced.
        let mut entries = tokio::fs::read_dir(dest_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("source.") && !name.ends_with(".part") {
                let path = entry.path();
                let len = entry.metadata().await?.len();
                if len == 0 {
                    return Err(FetchError::EmptyOutput);
                }
                tracing::debug!(path = %path.display(), bytes = len, "Download finished");
                return Ok(FetchedMedia {
                    path,
                    duration_hint: None,
                });
            }
        }
        Err(FetchError::EmptyOutput)
    }
}

/// Last non-empty stderr line, bounded to a length fit for an error field.
fn last_stderr_line(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let line = text
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("no output from downloader");
    let mut line = line.trim().to_string();
    if line.len() > STDERR_LIMIT {
        line.truncate(STDERR_LIMIT);
    }
    line
}
