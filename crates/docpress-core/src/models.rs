//! Domain models shared across the docpress crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::defaults;

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Status of a submitted document.
///
/// Transitions follow the DAG
/// `pending → processing → {completed, failed}`, with a single later
/// `completed → archived` step. Archived is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Archived,
}

impl DocumentStatus {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Archived => "archived",
        }
    }

    /// Parse from the database string form.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => DocumentStatus::Pending,
            "processing" => DocumentStatus::Processing,
            "completed" => DocumentStatus::Completed,
            "failed" => DocumentStatus::Failed,
            "archived" => DocumentStatus::Archived,
            _ => DocumentStatus::Pending, // fallback
        }
    }

    /// Whether no further transition (except completed → archived) is allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed | DocumentStatus::Failed | DocumentStatus::Archived
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A submitted document and its conversion outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    /// Object-storage key of the original upload. Absent until the blob
    /// transfer has been recorded by the submission side.
    pub blob_key: Option<String>,
    /// Converted Markdown. Non-null iff status is completed or archived.
    pub content: Option<String>,
    /// Free-form metadata map. Round-trips verbatim.
    pub metadata: JsonValue,
    pub status: DocumentStatus,
    pub error: Option<String>,
    pub retention_days: i64,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
    pub batch_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a document row.
#[derive(Debug, Clone, Default)]
pub struct CreateDocumentRequest {
    pub file_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub blob_key: Option<String>,
    pub metadata: Option<JsonValue>,
    pub retention_days: Option<i64>,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
    pub batch_id: Option<String>,
}

// =============================================================================
// JOBS
// =============================================================================

/// Status of a job in the queue.
///
/// There is no materialized "retrying" state: a retry is a pending job whose
/// `scheduled_at` lies in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Parse from the database string form.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending, // fallback
        }
    }

    /// Whether the job can never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Convert a document to Markdown via the OCR provider.
    Convert,
    /// Relocate a completed document's blob to the archive prefix.
    Archive,
}

impl JobType {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Convert => "convert",
            JobType::Archive => "archive",
        }
    }

    /// Parse from the database string form.
    pub fn parse(s: &str) -> Self {
        match s {
            "convert" => JobType::Convert,
            "archive" => JobType::Archive,
            _ => JobType::Convert, // fallback
        }
    }

    /// Default priority for this job type (higher = more urgent).
    pub fn default_priority(&self) -> i64 {
        match self {
            // Conversions gate user-visible results
            JobType::Convert => 5,
            // Archival is background housekeeping
            JobType::Archive => 1,
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub document_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error: Option<String>,
    /// Set while a worker holds the claim; that worker has exclusive update
    /// rights to the row.
    pub worker_id: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for enqueuing a job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub document_id: String,
    pub job_type: JobType,
    pub priority: Option<i64>,
    pub payload: Option<JsonValue>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub max_attempts: Option<i64>,
}

impl CreateJobRequest {
    /// Convenience constructor with per-type defaults.
    pub fn new(document_id: impl Into<String>, job_type: JobType) -> Self {
        Self {
            document_id: document_id.into(),
            job_type,
            priority: None,
            payload: None,
            scheduled_at: None,
            max_attempts: None,
        }
    }
}

/// Terminal outcome written for a job and its document in one transaction.
#[derive(Debug, Clone)]
pub enum JobCompletion {
    /// Conversion succeeded: document gets content and merged metadata.
    Succeeded {
        content: String,
        metadata: JsonValue,
        result: Option<JsonValue>,
    },
    /// The job failed terminally: both rows record the error.
    Failed { error: String },
    /// Archival succeeded: document becomes archived with updated metadata.
    Archived { metadata: JsonValue },
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}

// =============================================================================
// BATCHES
// =============================================================================

/// Status of a document batch, derived by recount from child documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    /// String form stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }

    /// Parse from the database string form.
    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => BatchStatus::Pending,
            "processing" => BatchStatus::Processing,
            "completed" => BatchStatus::Completed,
            "failed" => BatchStatus::Failed,
            _ => BatchStatus::Pending, // fallback
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Failed)
    }

    /// Derive the batch status from child document counts.
    ///
    /// Terminal iff `completed + failed == total` (with a non-empty batch);
    /// `failed` only when every child failed; `processing` once any child has
    /// reached a terminal state.
    pub fn derive(total: i64, completed: i64, failed: i64) -> Self {
        if total > 0 && completed + failed == total {
            if failed == total {
                BatchStatus::Failed
            } else {
                BatchStatus::Completed
            }
        } else if completed + failed > 0 {
            BatchStatus::Processing
        } else {
            BatchStatus::Pending
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A batch of documents submitted together.
///
/// Progress counts are a derived projection over child documents, never a
/// source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
    pub total_documents: i64,
    pub completed_documents: i64,
    pub failed_documents: i64,
    pub status: BatchStatus,
    pub priority: i64,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for creating a batch row.
#[derive(Debug, Clone, Default)]
pub struct CreateBatchRequest {
    pub user_id: Option<String>,
    pub api_key_id: Option<String>,
    pub total_documents: i64,
    pub priority: Option<i64>,
    pub metadata: Option<JsonValue>,
}

// =============================================================================
// USAGE
// =============================================================================

/// One usage/cost record per successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub id: String,
    pub document_id: String,
    pub operation: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub base_cost_cents: i64,
    /// Integer percent applied on top of base cost.
    pub margin_rate: i64,
    pub total_cost_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Pages estimated from total token usage: `ceil(total_tokens / PAGE_TOKENS)`.
pub fn estimated_pages(total_tokens: i64) -> i64 {
    if total_tokens <= 0 {
        return 0;
    }
    (total_tokens + defaults::PAGE_TOKENS - 1) / defaults::PAGE_TOKENS
}

/// Base conversion cost in cents for an estimated page count.
pub fn base_cost_cents(pages: i64) -> i64 {
    pages.max(0) * defaults::PAGE_COST_CENTS
}

/// Total cost in cents: `ceil(base * (1 + margin/100))` in integer math.
pub fn total_cost_cents(base_cents: i64, margin_rate: i64) -> i64 {
    let scaled = base_cents.max(0) * (100 + margin_rate.max(0));
    (scaled + 99) / 100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_status_round_trip() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
            DocumentStatus::Archived,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_document_status_unknown_fallback() {
        assert_eq!(DocumentStatus::parse("bogus"), DocumentStatus::Pending);
        assert_eq!(DocumentStatus::parse(""), DocumentStatus::Pending);
    }

    #[test]
    fn test_document_status_terminality() {
        assert!(!DocumentStatus::Pending.is_terminal());
        assert!(!DocumentStatus::Processing.is_terminal());
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(DocumentStatus::Archived.is_terminal());
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_job_type_round_trip() {
        for job_type in [JobType::Convert, JobType::Archive] {
            assert_eq!(JobType::parse(job_type.as_str()), job_type);
        }
    }

    #[test]
    fn test_job_type_strings_are_unique() {
        assert_ne!(JobType::Convert.as_str(), JobType::Archive.as_str());
    }

    #[test]
    fn test_convert_outranks_archive() {
        assert!(JobType::Convert.default_priority() > JobType::Archive.default_priority());
    }

    #[test]
    fn test_batch_status_derivation() {
        // Nothing done yet
        assert_eq!(BatchStatus::derive(3, 0, 0), BatchStatus::Pending);
        // Partial progress
        assert_eq!(BatchStatus::derive(3, 1, 0), BatchStatus::Processing);
        assert_eq!(BatchStatus::derive(3, 1, 1), BatchStatus::Processing);
        // Terminal with any success
        assert_eq!(BatchStatus::derive(3, 2, 1), BatchStatus::Completed);
        assert_eq!(BatchStatus::derive(3, 3, 0), BatchStatus::Completed);
        // Terminal with total failure
        assert_eq!(BatchStatus::derive(3, 0, 3), BatchStatus::Failed);
    }

    #[test]
    fn test_empty_batch_stays_pending() {
        assert_eq!(BatchStatus::derive(0, 0, 0), BatchStatus::Pending);
    }

    #[test]
    fn test_estimated_pages() {
        assert_eq!(estimated_pages(0), 0);
        assert_eq!(estimated_pages(1), 1);
        assert_eq!(estimated_pages(999), 1);
        assert_eq!(estimated_pages(1000), 1);
        assert_eq!(estimated_pages(1001), 2);
        assert_eq!(estimated_pages(5000), 5);
        assert_eq!(estimated_pages(-10), 0);
    }

    #[test]
    fn test_cost_arithmetic() {
        // 3 pages at 1c with 30% margin: ceil(3 * 1.3) = 4
        let base = base_cost_cents(3);
        assert_eq!(base, 3);
        assert_eq!(total_cost_cents(base, 30), 4);

        // 10 pages: ceil(10 * 1.3) = 13
        assert_eq!(total_cost_cents(base_cost_cents(10), 30), 13);

        // Zero base stays zero
        assert_eq!(total_cost_cents(0, 30), 0);

        // Margin of zero is identity
        assert_eq!(total_cost_cents(7, 0), 7);
    }

    #[test]
    fn test_cost_rounds_up_not_nearest() {
        // ceil(1 * 1.3) = 2, not 1
        assert_eq!(total_cost_cents(1, 30), 2);
        // ceil(100 * 1.01) = 101
        assert_eq!(total_cost_cents(100, 1), 101);
    }

    #[test]
    fn test_status_serde_forms_match_db_forms() {
        let json = serde_json::to_string(&DocumentStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        let json = serde_json::to_string(&JobType::Convert).unwrap();
        assert_eq!(json, "\"convert\"");
        let json = serde_json::to_string(&BatchStatus::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
    }

    #[test]
    fn test_create_job_request_new() {
        let req = CreateJobRequest::new("doc-1", JobType::Convert);
        assert_eq!(req.document_id, "doc-1");
        assert_eq!(req.job_type, JobType::Convert);
        assert!(req.priority.is_none());
        assert!(req.scheduled_at.is_none());
    }
}
