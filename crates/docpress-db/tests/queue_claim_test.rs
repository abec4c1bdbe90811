//! Integration tests for queue claim semantics.
//!
//! Covers: single-claim atomicity under concurrent workers, priority and
//! scheduled-at ordering, attempt accounting, and the job/document co-commit.

use chrono::Utc;
use serde_json::json;

use docpress_db::test_fixtures::{file_db, memory_db, sample_document};
use docpress_db::{
    CreateJobRequest, Database, Error, JobCompletion, JobStatus, JobType,
};

async fn create_document(db: &Database, name: &str) -> String {
    db.documents
        .create(&sample_document(name))
        .await
        .expect("Failed to create document")
}

async fn create_convert_job(db: &Database, document_id: &str) -> String {
    db.jobs
        .create(&CreateJobRequest::new(document_id, JobType::Convert))
        .await
        .expect("Failed to create job")
}

#[tokio::test]
async fn test_claim_empty_queue_returns_none() {
    let db = memory_db().await;
    let claimed = db.jobs.claim_next("worker-a").await.unwrap();
    assert!(claimed.is_none());
}

#[tokio::test]
async fn test_claim_ignores_future_scheduled_jobs() {
    let db = memory_db().await;
    let doc = create_document(&db, "future.pdf").await;

    let mut req = CreateJobRequest::new(&doc, JobType::Convert);
    req.scheduled_at = Some(Utc::now() + chrono::Duration::minutes(10));
    db.jobs.create(&req).await.unwrap();

    let claimed = db.jobs.claim_next("worker-a").await.unwrap();
    assert!(claimed.is_none());
}

#[tokio::test]
async fn test_claim_stamps_worker_and_increments_attempts() {
    let db = memory_db().await;
    let doc = create_document(&db, "claim.pdf").await;
    let job_id = create_convert_job(&db, &doc).await;

    let job = db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    assert_eq!(job.id, job_id);
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.worker_id.as_deref(), Some("worker-a"));
    assert_eq!(job.attempts, 1);
    assert!(job.started_at.is_some());
}

#[tokio::test]
async fn test_claim_order_priority_then_scheduled_then_insertion() {
    let db = memory_db().await;
    let doc = create_document(&db, "order.pdf").await;
    let base = Utc::now() - chrono::Duration::seconds(60);

    // Low priority but earliest schedule
    let mut low = CreateJobRequest::new(&doc, JobType::Convert);
    low.priority = Some(1);
    low.scheduled_at = Some(base);
    let low_id = db.jobs.create(&low).await.unwrap();

    // High priority, later schedule
    let mut high_late = CreateJobRequest::new(&doc, JobType::Convert);
    high_late.priority = Some(9);
    high_late.scheduled_at = Some(base + chrono::Duration::seconds(5));
    let high_late_id = db.jobs.create(&high_late).await.unwrap();

    // High priority, earlier schedule
    let mut high_early = CreateJobRequest::new(&doc, JobType::Convert);
    high_early.priority = Some(9);
    high_early.scheduled_at = Some(base + chrono::Duration::seconds(1));
    let high_early_id = db.jobs.create(&high_early).await.unwrap();

    let first = db.jobs.claim_next("w").await.unwrap().unwrap();
    let second = db.jobs.claim_next("w").await.unwrap().unwrap();
    let third = db.jobs.claim_next("w").await.unwrap().unwrap();

    assert_eq!(first.id, high_early_id);
    assert_eq!(second.id, high_late_id);
    assert_eq!(third.id, low_id);
}

// Scenario: three equal-priority jobs, two workers claiming alternately.
#[tokio::test]
async fn test_two_workers_drain_three_jobs_in_schedule_order() {
    let db = memory_db().await;
    let doc = create_document(&db, "drain.pdf").await;
    let base = Utc::now() - chrono::Duration::seconds(30);

    let mut ids = Vec::new();
    for offset in [0, 0, 1] {
        let mut req = CreateJobRequest::new(&doc, JobType::Convert);
        req.priority = Some(5);
        req.scheduled_at = Some(base + chrono::Duration::seconds(offset));
        ids.push(db.jobs.create(&req).await.unwrap());
    }

    let a = db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    let b = db.jobs.claim_next("worker-b").await.unwrap().unwrap();

    // Equal priority and scheduled_at: insertion order breaks the tie.
    assert_eq!(a.id, ids[0]);
    assert_eq!(b.id, ids[1]);
    assert_eq!(a.attempts, 1);
    assert_eq!(b.attempts, 1);

    let c = db.jobs.claim_next("worker-b").await.unwrap().unwrap();
    assert_eq!(c.id, ids[2]);

    assert!(db.jobs.claim_next("worker-a").await.unwrap().is_none());
}

#[tokio::test]
async fn test_at_most_one_concurrent_claim_per_job() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir.path().join("claims.db"), 8).await;
    let doc = create_document(&db, "contested.pdf").await;
    create_convert_job(&db, &doc).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.jobs.claim_next(&format!("worker-{i}")).await
        }));
    }

    let mut claims = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.is_some() {
            claims += 1;
        }
    }
    assert_eq!(claims, 1, "exactly one worker may claim the job");

    let job = db.jobs.claim_next("late-worker").await.unwrap();
    assert!(job.is_none());
}

#[tokio::test]
async fn test_complete_co_commits_job_and_document() {
    let db = memory_db().await;
    let doc_id = create_document(&db, "commit.pdf").await;
    let job_id = create_convert_job(&db, &doc_id).await;

    db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    db.documents.mark_processing(&doc_id).await.unwrap();

    db.jobs
        .complete_job_and_document(
            &job_id,
            &doc_id,
            &JobCompletion::Succeeded {
                content: "# Converted\n\nbody".to_string(),
                metadata: json!({"model": "ocr-small", "extracted_pages": 2}),
                result: Some(json!({"total_tokens": 1500})),
            },
        )
        .await
        .unwrap();

    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    let doc = db.documents.get(&doc_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert_eq!(doc.status.as_str(), "completed");
    assert_eq!(doc.content.as_deref(), Some("# Converted\n\nbody"));
    assert_eq!(doc.metadata["model"], "ocr-small");
    assert!(doc.processed_at.is_some());
}

#[tokio::test]
async fn test_complete_rejects_unclaimed_job() {
    let db = memory_db().await;
    let doc_id = create_document(&db, "unclaimed.pdf").await;
    let job_id = create_convert_job(&db, &doc_id).await;

    let result = db
        .jobs
        .complete_job_and_document(
            &job_id,
            &doc_id,
            &JobCompletion::Succeeded {
                content: "x".to_string(),
                metadata: json!({}),
                result: None,
            },
        )
        .await;

    assert!(matches!(result, Err(Error::InvalidState(_))));

    // Neither row was touched.
    let job = db.jobs.get(&job_id).await.unwrap().unwrap();
    let doc = db.documents.get(&doc_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(doc.content.is_none());
}

#[tokio::test]
async fn test_archive_completion_requires_completed_document() {
    let db = memory_db().await;
    let doc_id = create_document(&db, "early-archive.pdf").await;
    let job_id = db
        .jobs
        .create(&CreateJobRequest::new(&doc_id, JobType::Archive))
        .await
        .unwrap();

    db.jobs.claim_next("worker-a").await.unwrap().unwrap();

    let result = db
        .jobs
        .complete_job_and_document(
            &job_id,
            &doc_id,
            &JobCompletion::Archived {
                metadata: json!({"archive_key": "archive/early-archive.pdf"}),
            },
        )
        .await;

    assert!(matches!(result, Err(Error::InvalidState(_))));
}

// Two convert jobs enqueued against one document: the second claimant is
// turned away at the processing gate, and a late commit from it cannot
// overwrite the winner's content.
#[tokio::test]
async fn test_duplicate_convert_claims_cannot_share_a_document() {
    let db = memory_db().await;
    let doc_id = create_document(&db, "contested-doc.pdf").await;
    let first_job = create_convert_job(&db, &doc_id).await;
    let second_job = create_convert_job(&db, &doc_id).await;

    let a = db.jobs.claim_next("worker-a").await.unwrap().unwrap();
    let b = db.jobs.claim_next("worker-b").await.unwrap().unwrap();
    assert_eq!(a.id, first_job);
    assert_eq!(b.id, second_job);

    db.documents.mark_processing(&doc_id).await.unwrap();
    let conflict = db.documents.mark_processing(&doc_id).await;
    assert!(matches!(conflict, Err(Error::InvalidState(_))));

    db.jobs
        .complete_job_and_document(
            &first_job,
            &doc_id,
            &JobCompletion::Succeeded {
                content: "# first result".to_string(),
                metadata: json!({"model": "ocr-small"}),
                result: None,
            },
        )
        .await
        .unwrap();

    let late = db
        .jobs
        .complete_job_and_document(
            &second_job,
            &doc_id,
            &JobCompletion::Succeeded {
                content: "# second result".to_string(),
                metadata: json!({"model": "ocr-small"}),
                result: None,
            },
        )
        .await;
    assert!(matches!(late, Err(Error::InvalidState(_))));

    let doc = db.documents.get(&doc_id).await.unwrap().unwrap();
    assert_eq!(doc.content.as_deref(), Some("# first result"));

    // The rejected commit rolled back whole: the losing job row is untouched
    // and left for fail routing.
    let second = db.jobs.get(&second_job).await.unwrap().unwrap();
    assert_eq!(second.status, JobStatus::Processing);
}

#[tokio::test]
async fn test_metadata_round_trips_verbatim() {
    let db = memory_db().await;
    let mut req = sample_document("meta.pdf");
    req.metadata = Some(json!({
        "nested": {"a": [1, 2, 3], "b": null},
        "unicode": "snöglobe",
        "float": 1.25
    }));
    let doc_id = db.documents.create(&req).await.unwrap();

    let doc = db.documents.get(&doc_id).await.unwrap().unwrap();
    assert_eq!(doc.metadata, req.metadata.unwrap());
}
