use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use kikitori::application::ports::JobRepository;
use kikitori::application::services::RetentionSweeper;
use kikitori::domain::{Job, SourceKind};
use kikitori::infrastructure::persistence::{init_pool, SqliteJobRepository};
use kikitori::infrastructure::storage::JobWorkspace;

async fn setup() -> (
    tempfile::TempDir,
    Arc<SqliteJobRepository>,
    Arc<JobWorkspace>,
    RetentionSweeper,
) {
    let dir = tempfile::TempDir::new().unwrap();
    let pool = init_pool(&dir.path().join("jobs.db")).await.unwrap();
    let repository = Arc::new(SqliteJobRepository::new(pool));
    let workspace = Arc::new(JobWorkspace::new(dir.path()).unwrap());
    let sweeper = RetentionSweeper::new(
        repository.clone() as Arc<dyn JobRepository>,
        workspace.clone(),
        Duration::from_secs(3600),
    );
    (dir, repository, workspace, sweeper)
}

async fn insert_job(
    repository: &SqliteJobRepository,
    workspace: &JobWorkspace,
    expired: bool,
) -> Job {
    let mut job = Job::new(SourceKind::Upload, "clip.wav", None, 7);
    if expired {
        job.expires_at = Utc::now() - chrono::Duration::hours(1);
    }
    workspace.create_layout(&job.id).await.unwrap();
    tokio::fs::write(
        workspace.input_dir(&job.id).join("source.wav"),
        b"stale bytes",
    )
    .await
    .unwrap();
    repository.insert(&job).await.unwrap();
    job
}

#[tokio::test]
async fn given_expired_and_fresh_jobs_when_sweeping_then_only_expired_removed() {
    let (_dir, repository, workspace, sweeper) = setup().await;
    let expired = insert_job(&repository, &workspace, true).await;
    let fresh = insert_job(&repository, &workspace, false).await;

    let removed = sweeper.sweep_once().await;

    assert_eq!(removed, 1);
    assert!(repository.get(&expired.id).await.unwrap().is_none());
    assert!(!workspace.exists(&expired.id));
    assert!(repository.get(&fresh.id).await.unwrap().is_some());
    assert!(workspace.exists(&fresh.id));
}

#[tokio::test]
async fn given_expired_job_with_missing_directory_when_sweeping_then_row_still_removed() {
    let (_dir, repository, workspace, sweeper) = setup().await;
    let expired = insert_job(&repository, &workspace, true).await;
    workspace.remove(&expired.id).await.unwrap();

    let removed = sweeper.sweep_once().await;

    assert_eq!(removed, 1);
    assert!(repository.get(&expired.id).await.unwrap().is_none());
}

#[tokio::test]
async fn given_nothing_expired_when_sweeping_then_idempotent_no_op() {
    let (_dir, repository, workspace, sweeper) = setup().await;
    let fresh = insert_job(&repository, &workspace, false).await;

    assert_eq!(sweeper.sweep_once().await, 0);
    assert_eq!(sweeper.sweep_once().await, 0);
    assert!(repository.get(&fresh.id).await.unwrap().is_some());
}
