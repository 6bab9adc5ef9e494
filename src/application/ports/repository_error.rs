#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("query failed: {0}")]
    QueryFailed(String),
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("duplicate job id: {0}")]
    DuplicateId(String),
    #[error("illegal transition for {job_id}: {from} -> {to}")]
    IllegalTransition {
        job_id: String,
        from: String,
        to: String,
    },
}
