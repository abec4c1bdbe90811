//! Job queue repository.
//!
//! Owns the durable queue semantics: atomic single-claim dispatch, the retry
//! policy with exponential backoff, orphan recovery, and the job/document
//! co-commit. All writes route through the bounded-retry wrapper.

use std::time::Duration;

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{debug, warn};

use docpress_core::{
    defaults, new_id, CreateJobRequest, Error, Job, JobCompletion, JobStatus, JobType, QueueStats,
    Result,
};

use crate::retry::with_write_retry;

const JOB_COLUMNS: &str = "id, document_id, job_type, status, priority, attempts, max_attempts, \
     payload, result, error, worker_id, scheduled_at, started_at, completed_at, created_at";

/// Backoff applied when a failed job is rescheduled: `2^attempts * 60s`.
/// Retries of real conversion work are expensive.
pub fn retry_backoff(attempts: i64) -> chrono::Duration {
    let shift = attempts.clamp(0, defaults::MAX_BACKOFF_SHIFT) as u32;
    chrono::Duration::seconds(defaults::RETRY_BACKOFF_BASE_SECS << shift)
}

/// Backoff applied when an orphaned job is reset: `2^attempts * 5s`.
/// Orphans never produced an outcome, so they are re-admitted sooner.
pub fn orphan_reset_backoff(attempts: i64) -> chrono::Duration {
    let shift = attempts.clamp(0, defaults::MAX_BACKOFF_SHIFT) as u32;
    chrono::Duration::seconds(defaults::ORPHAN_RESET_BACKOFF_BASE_SECS << shift)
}

/// Result of an orphan-recovery sweep.
#[derive(Debug, Default)]
pub struct OrphanSweep {
    /// Rows reset or failed by the sweep.
    pub processed: usize,
    /// Documents that were failed alongside exhausted jobs.
    pub failed_documents: Vec<String>,
    /// Batches whose progress must be recomputed.
    pub affected_batches: Vec<String>,
}

/// Parse a job row into a Job struct.
pub(crate) fn job_from_row(row: &SqliteRow) -> Result<Job> {
    Ok(Job {
        id: row.try_get("id")?,
        document_id: row.try_get("document_id")?,
        job_type: JobType::parse(&row.try_get::<String, _>("job_type")?),
        status: JobStatus::parse(&row.try_get::<String, _>("status")?),
        priority: row.try_get("priority")?,
        attempts: row.try_get("attempts")?,
        max_attempts: row.try_get("max_attempts")?,
        payload: row
            .try_get::<Option<Json<JsonValue>>, _>("payload")?
            .map(|j| j.0),
        result: row
            .try_get::<Option<Json<JsonValue>>, _>("result")?
            .map(|j| j.0),
        error: row.try_get("error")?,
        worker_id: row.try_get("worker_id")?,
        scheduled_at: row.try_get("scheduled_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// SQLite implementation of the job queue repository.
pub struct SqliteJobRepository {
    pool: SqlitePool,
    read_pool: SqlitePool,
}

impl SqliteJobRepository {
    /// Create a repository over a write pool and a read pool (which may be
    /// the same pool when no replica is configured).
    pub fn new(pool: SqlitePool, read_pool: SqlitePool) -> Self {
        Self { pool, read_pool }
    }

    /// Enqueue a job in status pending. Defaults: scheduled_at = now,
    /// priority by job type, max_attempts from defaults.
    pub async fn create(&self, req: &CreateJobRequest) -> Result<String> {
        let id = new_id();
        let priority = req
            .priority
            .unwrap_or_else(|| req.job_type.default_priority());
        let max_attempts = req.max_attempts.unwrap_or(defaults::JOB_MAX_ATTEMPTS).max(1);

        with_write_retry("create_job", || async {
            let now = Utc::now();
            let scheduled_at = req.scheduled_at.unwrap_or(now);
            sqlx::query(
                "INSERT INTO jobs (id, document_id, job_type, status, priority, attempts, \
                 max_attempts, payload, scheduled_at, created_at) \
                 VALUES (?, ?, ?, 'pending', ?, 0, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&req.document_id)
            .bind(req.job_type.as_str())
            .bind(priority)
            .bind(max_attempts)
            .bind(req.payload.as_ref().map(Json))
            .bind(scheduled_at)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    /// Get a job by id.
    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(job_from_row).transpose()
    }

    /// Atomically claim the next ready job for a worker.
    ///
    /// One transaction selects the single highest-priority pending job whose
    /// `scheduled_at` is due (ties broken by ascending scheduled_at, then
    /// insertion order), stamps worker_id/started_at, and increments attempts.
    /// The `AND status = 'pending'` guard re-checks the row inside the same
    /// statement, so a racing claimer observes None rather than a double
    /// claim. An empty queue also yields None.
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        with_write_retry("claim_next", || async {
            let now = Utc::now();
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;

            let row = sqlx::query(&format!(
                "UPDATE jobs \
                 SET status = 'processing', worker_id = ?, started_at = ?, \
                     attempts = attempts + 1 \
                 WHERE id = ( \
                     SELECT id FROM jobs \
                     WHERE status = 'pending' AND scheduled_at <= ? \
                     ORDER BY priority DESC, scheduled_at ASC, created_at ASC, id ASC \
                     LIMIT 1 \
                 ) \
                 AND status = 'pending' \
                 RETURNING {JOB_COLUMNS}"
            ))
            .bind(worker_id)
            .bind(now)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;

            tx.commit().await.map_err(Error::Database)?;

            row.as_ref().map(job_from_row).transpose()
        })
        .await
    }

    /// Write a job's terminal outcome and its document's matching state in a
    /// single transaction, so readers never observe a completed job next to
    /// an unconverted document.
    pub async fn complete_job_and_document(
        &self,
        job_id: &str,
        document_id: &str,
        completion: &JobCompletion,
    ) -> Result<()> {
        with_write_retry("complete_job_and_document", || async {
            let now = Utc::now();
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;

            match completion {
                JobCompletion::Succeeded {
                    content,
                    metadata,
                    result,
                } => {
                    let updated = sqlx::query(
                        "UPDATE jobs SET status = 'completed', completed_at = ?, result = ? \
                         WHERE id = ? AND status = 'processing'",
                    )
                    .bind(now)
                    .bind(result.as_ref().map(Json))
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
                    if updated.rows_affected() == 0 {
                        return Err(Error::InvalidState(format!(
                            "job {} is not processing",
                            job_id
                        )));
                    }

                    let doc_updated = sqlx::query(
                        "UPDATE documents SET status = 'completed', processed_at = ?, \
                         content = ?, metadata = ? WHERE id = ? AND status = 'processing'",
                    )
                    .bind(now)
                    .bind(content)
                    .bind(Json(metadata))
                    .bind(document_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
                    if doc_updated.rows_affected() == 0 {
                        // The document was resolved by another outcome; roll
                        // back rather than complete a job against it.
                        return Err(Error::InvalidState(format!(
                            "document {} is not processing and cannot accept this result",
                            document_id
                        )));
                    }
                }
                JobCompletion::Failed { error } => {
                    let updated = sqlx::query(
                        "UPDATE jobs SET status = 'failed', completed_at = ?, error = ? \
                         WHERE id = ? AND status = 'processing'",
                    )
                    .bind(now)
                    .bind(error)
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
                    if updated.rows_affected() == 0 {
                        return Err(Error::InvalidState(format!(
                            "job {} is not processing",
                            job_id
                        )));
                    }

                    sqlx::query(
                        "UPDATE documents SET status = 'failed', error = ? \
                         WHERE id = ? AND status NOT IN ('completed', 'archived')",
                    )
                    .bind(error)
                    .bind(document_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
                }
                JobCompletion::Archived { metadata } => {
                    let updated = sqlx::query(
                        "UPDATE documents SET status = 'archived', archived_at = ?, metadata = ? \
                         WHERE id = ? AND status = 'completed'",
                    )
                    .bind(now)
                    .bind(Json(metadata))
                    .bind(document_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
                    if updated.rows_affected() == 0 {
                        return Err(Error::InvalidState(format!(
                            "document {} is not completed and cannot be archived",
                            document_id
                        )));
                    }

                    sqlx::query(
                        "UPDATE jobs SET status = 'completed', completed_at = ? \
                         WHERE id = ? AND status = 'processing'",
                    )
                    .bind(now)
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(Error::Database)?;
                }
            }

            tx.commit().await.map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    /// Record a job failure, deciding retry vs terminal from the attempts
    /// value already incremented by the claim.
    ///
    /// attempts < max_attempts: back to pending with
    /// `scheduled_at = now + 2^attempts * 60s`, worker_id and started_at
    /// cleared. Otherwise the job becomes terminal failed. Returns the
    /// resulting status. Jobs no longer in processing are left untouched.
    pub async fn fail(&self, job_id: &str, error: &str) -> Result<JobStatus> {
        with_write_retry("fail_job", || async {
            let now = Utc::now();
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;

            let row: Option<(i64, i64, String)> =
                sqlx::query_as("SELECT attempts, max_attempts, status FROM jobs WHERE id = ?")
                    .bind(job_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(Error::Database)?;

            let Some((attempts, max_attempts, status)) = row else {
                return Err(Error::JobNotFound(job_id.to_string()));
            };
            let status = JobStatus::parse(&status);
            if status != JobStatus::Processing {
                warn!(
                    subsystem = "db",
                    component = "jobs",
                    job_id,
                    status = %status,
                    "fail_job skipped job that is not processing"
                );
                return Ok(status);
            }

            let next = if attempts < max_attempts {
                let scheduled_at = now + retry_backoff(attempts);
                sqlx::query(
                    "UPDATE jobs SET status = 'pending', error = ?, scheduled_at = ?, \
                     worker_id = NULL, started_at = NULL \
                     WHERE id = ? AND status = 'processing'",
                )
                .bind(error)
                .bind(scheduled_at)
                .bind(job_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                JobStatus::Pending
            } else {
                sqlx::query(
                    "UPDATE jobs SET status = 'failed', error = ?, completed_at = ? \
                     WHERE id = ? AND status = 'processing'",
                )
                .bind(error)
                .bind(now)
                .bind(job_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                JobStatus::Failed
            };

            tx.commit().await.map_err(Error::Database)?;
            Ok(next)
        })
        .await
    }

    /// Fail a job terminally, skipping the remaining retry budget.
    ///
    /// Used for unrecoverable conditions such as a missing document row.
    pub async fn fail_terminal(&self, job_id: &str, error: &str) -> Result<()> {
        with_write_retry("fail_job_terminal", || async {
            let now = Utc::now();
            let result = sqlx::query(
                "UPDATE jobs SET status = 'failed', error = ?, completed_at = ? \
                 WHERE id = ? AND status = 'processing'",
            )
            .bind(error)
            .bind(now)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            if result.rows_affected() == 0 {
                warn!(
                    subsystem = "db",
                    component = "jobs",
                    job_id,
                    "fail_terminal skipped job that is not processing"
                );
            }
            Ok(())
        })
        .await
    }

    /// Recovery sweep for jobs stuck in processing past the threshold.
    ///
    /// Exhausted jobs (attempts >= max_attempts) are failed in one update,
    /// their documents failed in a second, and the affected batches reported
    /// for recomputation. Recoverable jobs are reset to pending within one
    /// transaction with `scheduled_at = now + 2^attempts * 5s`; their
    /// documents return from processing to pending in the same transaction.
    pub async fn cleanup_orphaned_jobs(&self, threshold: Duration) -> Result<OrphanSweep> {
        with_write_retry("cleanup_orphaned_jobs", || async {
            let now = Utc::now();
            let cutoff = now - chrono::Duration::seconds(threshold.as_secs() as i64);

            let stuck: Vec<(String, String, i64, i64)> = sqlx::query_as(
                "SELECT id, document_id, attempts, max_attempts FROM jobs \
                 WHERE status = 'processing' AND started_at IS NOT NULL AND started_at <= ?",
            )
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

            if stuck.is_empty() {
                return Ok(OrphanSweep::default());
            }

            let (to_fail, to_reset): (Vec<_>, Vec<_>) = stuck
                .into_iter()
                .partition(|(_, _, attempts, max_attempts)| attempts >= max_attempts);

            let mut sweep = OrphanSweep {
                processed: to_fail.len() + to_reset.len(),
                ..OrphanSweep::default()
            };

            let mut tx = self.pool.begin().await.map_err(Error::Database)?;

            if !to_fail.is_empty() {
                let placeholders = vec!["?"; to_fail.len()].join(", ");

                let fail_jobs_sql = format!(
                    "UPDATE jobs SET status = 'failed', completed_at = ?, worker_id = NULL, \
                     error = ? WHERE id IN ({placeholders}) AND status = 'processing'"
                );
                let mut query = sqlx::query(&fail_jobs_sql)
                    .bind(now)
                    .bind(defaults::ORPHAN_EXHAUSTED_ERROR);
                for (job_id, _, _, _) in &to_fail {
                    query = query.bind(job_id);
                }
                query.execute(&mut *tx).await.map_err(Error::Database)?;

                let fail_docs_sql = format!(
                    "UPDATE documents SET status = 'failed', error = ? \
                     WHERE id IN ({placeholders}) AND status NOT IN ('completed', 'archived')"
                );
                let mut query = sqlx::query(&fail_docs_sql)
                    .bind(defaults::ORPHAN_EXHAUSTED_ERROR);
                for (_, document_id, _, _) in &to_fail {
                    query = query.bind(document_id);
                }
                query.execute(&mut *tx).await.map_err(Error::Database)?;

                sweep.failed_documents = to_fail
                    .iter()
                    .map(|(_, document_id, _, _)| document_id.clone())
                    .collect();
            }

            for (job_id, _, attempts, _) in &to_reset {
                let scheduled_at = now + orphan_reset_backoff(*attempts);
                sqlx::query(
                    "UPDATE jobs SET status = 'pending', worker_id = NULL, started_at = NULL, \
                     scheduled_at = ? WHERE id = ? AND status = 'processing'",
                )
                .bind(scheduled_at)
                .bind(job_id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
            }

            if !to_reset.is_empty() {
                // Their documents go back to pending too, so the next claim
                // passes the processing gate.
                let placeholders = vec!["?"; to_reset.len()].join(", ");
                let reset_docs_sql = format!(
                    "UPDATE documents SET status = 'pending' \
                     WHERE status = 'processing' AND id IN ({placeholders})"
                );
                let mut query = sqlx::query(&reset_docs_sql);
                for (_, document_id, _, _) in &to_reset {
                    query = query.bind(document_id);
                }
                query.execute(&mut *tx).await.map_err(Error::Database)?;
            }

            tx.commit().await.map_err(Error::Database)?;

            if !sweep.failed_documents.is_empty() {
                let placeholders = vec!["?"; sweep.failed_documents.len()].join(", ");
                let batches_sql = format!(
                    "SELECT DISTINCT batch_id FROM documents \
                     WHERE batch_id IS NOT NULL AND id IN ({placeholders})"
                );
                let mut query = sqlx::query_as::<_, (String,)>(&batches_sql);
                for document_id in &sweep.failed_documents {
                    query = query.bind(document_id);
                }
                sweep.affected_batches = query
                    .fetch_all(&self.pool)
                    .await
                    .map_err(Error::Database)?
                    .into_iter()
                    .map(|(batch_id,)| batch_id)
                    .collect();
            }

            debug!(
                subsystem = "db",
                component = "jobs",
                op = "cleanup_orphaned_jobs",
                failed = to_fail.len(),
                reset = to_reset.len(),
                "Orphan sweep processed stuck jobs"
            );

            Ok(sweep)
        })
        .await
    }

    /// Count pending jobs whose scheduled_at is due.
    pub async fn pending_ready_count(&self) -> Result<i64> {
        let now = Utc::now();
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status = 'pending' AND scheduled_at <= ?",
        )
        .bind(now)
        .fetch_one(&self.read_pool)
        .await
        .map_err(Error::Database)?;
        Ok(count)
    }

    /// Queue statistics summary.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        let row: (i64, i64, i64, i64, i64) = sqlx::query_as(
            "SELECT \
                COUNT(*) FILTER (WHERE status = 'pending'), \
                COUNT(*) FILTER (WHERE status = 'processing'), \
                COUNT(*) FILTER (WHERE status = 'completed' AND completed_at > ?), \
                COUNT(*) FILTER (WHERE status = 'failed' AND completed_at > ?), \
                COUNT(*) \
             FROM jobs",
        )
        .bind(hour_ago)
        .bind(hour_ago)
        .fetch_one(&self.read_pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            pending: row.0,
            processing: row.1,
            completed_last_hour: row.2,
            failed_last_hour: row.3,
            total: row.4,
        })
    }

    /// List jobs for a document, most recent first.
    pub async fn list_for_document(&self, document_id: &str) -> Result<Vec<Job>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE document_id = ? ORDER BY created_at DESC"
        ))
        .bind(document_id)
        .fetch_all(&self.read_pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(job_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_backoff_doubles() {
        assert_eq!(retry_backoff(0), chrono::Duration::seconds(60));
        assert_eq!(retry_backoff(1), chrono::Duration::seconds(120));
        assert_eq!(retry_backoff(2), chrono::Duration::seconds(240));
        assert_eq!(retry_backoff(3), chrono::Duration::seconds(480));
    }

    #[test]
    fn test_orphan_reset_backoff_doubles() {
        assert_eq!(orphan_reset_backoff(0), chrono::Duration::seconds(5));
        assert_eq!(orphan_reset_backoff(1), chrono::Duration::seconds(10));
        assert_eq!(orphan_reset_backoff(2), chrono::Duration::seconds(20));
    }

    #[test]
    fn test_backoff_monotonic_in_attempts() {
        for n in 0..10 {
            assert!(retry_backoff(n + 1) > retry_backoff(n));
            assert!(orphan_reset_backoff(n + 1) > orphan_reset_backoff(n));
        }
    }

    #[test]
    fn test_backoff_shift_is_capped() {
        // Pathological attempt counts must not overflow the shift.
        let capped = retry_backoff(defaults::MAX_BACKOFF_SHIFT + 100);
        assert_eq!(capped, retry_backoff(defaults::MAX_BACKOFF_SHIFT));
    }
}
