use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Explicit runtime configuration; every field maps to one environment
/// variable, parsed strictly at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub admin_password: String,
    pub api_key: Option<String>,
    pub data_dir: PathBuf,
    pub job_retention_days: i64,
    pub max_upload_size_mb: u64,
    pub model_unload_minutes: u64,
    pub whisper_model: String,
    pub whisper_threads: usize,
    pub queue_capacity: usize,
    pub keep_source: bool,
    pub model_load_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub extract_timeout_secs: u64,
    pub transcribe_timeout_secs: u64,
    pub sync_request_timeout_secs: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: optional("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("PORT", 8000)?,
            admin_password: optional("ADMIN_PASSWORD")
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing("ADMIN_PASSWORD"))?,
            api_key: optional("API_KEY").filter(|v| !v.is_empty()),
            data_dir: optional("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("/data")),
            job_retention_days: parsed("JOB_RETENTION_DAYS", 7)?,
            max_upload_size_mb: parsed("MAX_UPLOAD_SIZE_MB", 10_240)?,
            model_unload_minutes: parsed("MODEL_UNLOAD_MINUTES", 5)?,
            whisper_model: optional("WHISPER_MODEL").unwrap_or_else(|| "large-v3".to_string()),
            whisper_threads: parsed("WHISPER_THREADS", num_cpus::get())?,
            queue_capacity: parsed("QUEUE_CAPACITY", 32)?,
            keep_source: parsed("KEEP_SOURCE", false)?,
            model_load_timeout_secs: parsed("MODEL_LOAD_TIMEOUT_SECS", 300)?,
            download_timeout_secs: parsed("DOWNLOAD_TIMEOUT_SECS", 3600)?,
            extract_timeout_secs: parsed("EXTRACT_TIMEOUT_SECS", 1800)?,
            transcribe_timeout_secs: parsed("TRANSCRIBE_TIMEOUT_SECS", 7200)?,
            sync_request_timeout_secs: parsed("SYNC_REQUEST_TIMEOUT_SECS", 1800)?,
        })
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb * 1024 * 1024
    }

    pub fn idle_unload(&self) -> Duration {
        Duration::from_secs(self.model_unload_minutes * 60)
    }

    pub fn sync_request_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_request_timeout_secs)
    }
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok()
}

fn parsed<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
