//! Integration tests for failure retry scheduling, orphan recovery, and the
//! busy-retry write wrapper.

use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use docpress_db::test_fixtures::{file_db, make_job_ready, memory_db, sample_document};
use docpress_db::{
    defaults, with_write_retry, CreateBatchRequest, CreateJobRequest, Database, DocumentStatus,
    Error, JobStatus, JobType,
};

async fn create_document(db: &Database, name: &str) -> String {
    db.documents
        .create(&sample_document(name))
        .await
        .expect("Failed to create document")
}

async fn age_started_at(db: &Database, job_id: &str, age: chrono::Duration) {
    sqlx::query("UPDATE jobs SET started_at = ? WHERE id = ?")
        .bind(Utc::now() - age)
        .bind(job_id)
        .execute(&db.pool)
        .await
        .expect("Failed to age started_at");
}

// Scenario: repeated provider failures walk through 120s and 240s backoffs
// before the third failure turns terminal.
#[tokio::test]
async fn test_fail_job_backoff_sequence_then_terminal() {
    let db = memory_db().await;
    let doc = create_document(&db, "flaky.pdf").await;
    let job_id = db
        .jobs
        .create(&CreateJobRequest::new(&doc, JobType::Convert))
        .await
        .unwrap();

    // First failure: attempts=1 → pending at now + 2^1 * 60s
    db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    let failed_at = Utc::now();
    let status = db.jobs.fail(&job_id, "provider timeout").await.unwrap();
    assert_eq!(status, JobStatus::Pending);

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 1);
    assert_eq!(job.error.as_deref(), Some("provider timeout"));
    assert!(job.worker_id.is_none());
    assert!(job.started_at.is_none());
    let delay = job.scheduled_at - failed_at;
    assert!(delay >= chrono::Duration::seconds(119));
    assert!(delay <= chrono::Duration::seconds(121));

    // Second failure: attempts=2 → pending at now + 2^2 * 60s
    make_job_ready(&db, &job_id).await;
    db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    let failed_at = Utc::now();
    db.jobs.fail(&job_id, "provider timeout").await.unwrap();

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);
    let second_delay = job.scheduled_at - failed_at;
    assert!(second_delay >= chrono::Duration::seconds(239));
    assert!(second_delay <= chrono::Duration::seconds(241));
    assert!(second_delay > delay, "backoff must be monotonic");

    // Third failure: attempts=3 = max_attempts → terminal
    make_job_ready(&db, &job_id).await;
    db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    let status = db.jobs.fail(&job_id, "provider timeout").await.unwrap();
    assert_eq!(status, JobStatus::Failed);

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn test_fail_leaves_terminal_jobs_untouched() {
    let db = memory_db().await;
    let doc = create_document(&db, "sticky.pdf").await;
    let mut req = CreateJobRequest::new(&doc, JobType::Convert);
    req.max_attempts = Some(1);
    let job_id = db.jobs.create(&req).await.unwrap();

    db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    db.jobs.fail(&job_id, "first error").await.unwrap();

    let status = db.jobs.fail(&job_id, "second error").await.unwrap();
    assert_eq!(status, JobStatus::Failed);

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.error.as_deref(), Some("first error"));
}

// Scenario: a killed worker's job is reset once its started_at passes the
// threshold, then converts normally on the next claim.
#[tokio::test]
async fn test_orphan_reset_then_recovery() {
    let db = memory_db().await;
    let doc = create_document(&db, "orphan.pdf").await;
    let job_id = db
        .jobs
        .create(&CreateJobRequest::new(&doc, JobType::Convert))
        .await
        .unwrap();

    db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    db.documents.mark_processing(&doc).await.unwrap();
    age_started_at(&db, &job_id, chrono::Duration::minutes(6)).await;

    let swept_at = Utc::now();
    let processed = db
        .cleanup_orphaned_jobs(Duration::from_secs(defaults::ORPHAN_THRESHOLD_SECS))
        .await
        .unwrap();
    assert_eq!(processed, 1);

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(job.worker_id.is_none());
    assert!(job.started_at.is_none());
    // attempts=1 → reset to now + 2^1 * 5s
    let delay = job.scheduled_at - swept_at;
    assert!(delay >= chrono::Duration::seconds(9));
    assert!(delay <= chrono::Duration::seconds(11));

    // The sweep returned the document to pending alongside its job.
    let document = db.documents.get(&doc).await.unwrap().unwrap();
    assert_eq!(document.status, DocumentStatus::Pending);

    // A second sweep finds nothing: recovery happens exactly once.
    let processed = db
        .cleanup_orphaned_jobs(Duration::from_secs(defaults::ORPHAN_THRESHOLD_SECS))
        .await
        .unwrap();
    assert_eq!(processed, 0);

    // The reclaimed job passes the processing gate again.
    make_job_ready(&db, &job_id).await;
    let job = db.jobs.claim_next("worker-b").await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);
    db.documents.mark_processing(&doc).await.unwrap();
}

#[tokio::test]
async fn test_orphan_exhausted_fails_job_document_and_batch() {
    let db = memory_db().await;
    let batch_id = db
        .batches
        .create(&CreateBatchRequest {
            total_documents: 1,
            ..Default::default()
        })
        .await
        .unwrap();

    let mut doc_req = sample_document("exhausted.pdf");
    doc_req.batch_id = Some(batch_id.clone());
    let doc_id = db.documents.create(&doc_req).await.unwrap();

    let mut job_req = CreateJobRequest::new(&doc_id, JobType::Convert);
    job_req.max_attempts = Some(1);
    let job_id = db.jobs.create(&job_req).await.unwrap();

    db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    db.documents.mark_processing(&doc_id).await.unwrap();
    age_started_at(&db, &job_id, chrono::Duration::minutes(10)).await;

    let processed = db
        .cleanup_orphaned_jobs(Duration::from_secs(defaults::ORPHAN_THRESHOLD_SECS))
        .await
        .unwrap();
    assert_eq!(processed, 1);

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some(defaults::ORPHAN_EXHAUSTED_ERROR));
    assert!(job.worker_id.is_none());
    assert!(job.completed_at.is_some());

    let doc = db.documents.get(&doc_id).await.unwrap().unwrap();
    assert_eq!(doc.status.as_str(), "failed");
    assert_eq!(doc.error.as_deref(), Some(defaults::ORPHAN_EXHAUSTED_ERROR));

    let batch = db.batches.get(&batch_id).await.unwrap().unwrap();
    assert_eq!(batch.failed_documents, 1);
    assert_eq!(batch.status.as_str(), "failed");
}

#[tokio::test]
async fn test_fresh_processing_jobs_survive_the_sweep() {
    let db = memory_db().await;
    let doc = create_document(&db, "inflight.pdf").await;
    let job_id = db
        .jobs
        .create(&CreateJobRequest::new(&doc, JobType::Convert))
        .await
        .unwrap();

    db.jobs.claim_next("worker-a").await.unwrap().unwrap();

    let processed = db
        .cleanup_orphaned_jobs(Duration::from_secs(defaults::ORPHAN_THRESHOLD_SECS))
        .await
        .unwrap();
    assert_eq!(processed, 0);

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.worker_id.as_deref(), Some("worker-a"));
}

// Under write contention from many tasks, no caller observes a busy error.
#[tokio::test]
async fn test_concurrent_usage_writes_with_cleanup_never_surface_busy() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir.path().join("contention.db"), 8).await;

    let mut doc_ids = Vec::new();
    for i in 0..8 {
        doc_ids.push(create_document(&db, &format!("c{i}.pdf")).await);
    }

    let mut handles = Vec::new();
    for doc_id in doc_ids {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.usage.record_conversion(&doc_id, 900, 600, 1500).await
        }));
    }
    let sweeper = {
        let db = db.clone();
        tokio::spawn(async move {
            db.cleanup_orphaned_jobs(Duration::from_secs(defaults::ORPHAN_THRESHOLD_SECS))
                .await
        })
    };

    for handle in handles {
        let usage = handle.await.unwrap().expect("usage write surfaced an error");
        assert_eq!(usage.base_cost_cents, 2);
        assert_eq!(usage.total_cost_cents, 3);
    }
    sweeper.await.unwrap().expect("sweep surfaced an error");
}

// The wrapper rides out a writer lock held briefly by another connection.
#[tokio::test]
async fn test_write_retry_recovers_after_lock_released() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("locked.db");
    let db = file_db(&path, 2).await;
    create_document(&db, "seed.pdf").await;

    // A zero-busy-timeout pool observes raw SQLITE_BUSY errors.
    let impatient = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&path)
                .busy_timeout(Duration::from_millis(0)),
        )
        .await
        .unwrap();

    // Hold the write lock on a dedicated connection, release after 300ms.
    let mut locker = db.pool.acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *locker)
        .await
        .unwrap();
    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        sqlx::query("COMMIT").execute(&mut *locker).await.unwrap();
    });

    let result = with_write_retry("test_insert", || async {
        sqlx::query("UPDATE documents SET file_size = file_size + 1")
            .execute(&impatient)
            .await
            .map_err(Error::Database)?;
        Ok(())
    })
    .await;

    release.await.unwrap();
    assert!(result.is_ok(), "retry wrapper should absorb the busy window");
}
