//! Job handler trait and execution types.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use docpress_core::{Job, JobType};

/// Context provided to job handlers.
pub struct JobContext {
    /// The claimed job being processed.
    pub job: Job,
    /// Id of the worker holding the claim.
    pub worker_id: String,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job, worker_id: impl Into<String>) -> Self {
        Self {
            job,
            worker_id: worker_id.into(),
        }
    }

    /// The document this job operates on.
    pub fn document_id(&self) -> &str {
        &self.job.document_id
    }

    /// The job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
///
/// A successful handler has already co-committed the job and document
/// terminal rows in one transaction, so `Completed` carries nothing; the
/// worker routes the failure variants to the queue's retry policy.
#[derive(Debug)]
pub enum JobResult {
    /// Terminal success; the job/document co-commit has been written.
    Completed,
    /// The job failed; retry or terminal is decided by the retry budget.
    Failed(String),
    /// Unrecoverable failure; skips the remaining retry budget.
    FailedTerminal(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docpress_core::JobStatus;
    use serde_json::json;

    fn sample_job(payload: Option<JsonValue>) -> Job {
        Job {
            id: "job-1".to_string(),
            document_id: "doc-1".to_string(),
            job_type: JobType::Convert,
            status: JobStatus::Processing,
            priority: 5,
            attempts: 1,
            max_attempts: 3,
            payload,
            result: None,
            error: None,
            worker_id: Some("worker-0".to_string()),
            scheduled_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_context_accessors() {
        let ctx = JobContext::new(sample_job(Some(json!({"k": 1}))), "worker-0");
        assert_eq!(ctx.document_id(), "doc-1");
        assert_eq!(ctx.worker_id, "worker-0");
        assert_eq!(ctx.payload().unwrap()["k"], 1);
    }

    #[test]
    fn test_context_without_payload() {
        let ctx = JobContext::new(sample_job(None), "worker-0");
        assert!(ctx.payload().is_none());
    }
}
