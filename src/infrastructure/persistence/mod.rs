mod sqlite_job_repository;
mod sqlite_pool;

pub use sqlite_job_repository::SqliteJobRepository;
pub use sqlite_pool::init_pool;
