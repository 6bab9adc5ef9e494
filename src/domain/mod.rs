mod error_info;
mod job;
mod job_id;
mod job_status;
mod output_format;
mod source;
mod transcript;

pub use error_info::{ErrorInfo, ErrorKind};
pub use job::{Job, TranscribeTask};
pub use job_id::JobId;
pub use job_status::{JobStage, JobStatus};
pub use output_format::OutputFormat;
pub use source::SourceKind;
pub use transcript::{Segment, Transcript};
