//! Structured logging field name constants for docpress.
//!
//! All crates use these constants for consistent structured logging fields
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

/// Subsystem originating the log event.
/// Values: "db", "storage", "ocr", "jobs", "daemon"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "retry", "worker", "dispatcher", "convert"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "claim_next", "fail_job", "cleanup_orphaned_jobs"
pub const OPERATION: &str = "op";

/// Document id being operated on.
pub const DOCUMENT_ID: &str = "document_id";

/// Job id being processed.
pub const JOB_ID: &str = "job_id";

/// Job type string form.
pub const JOB_TYPE: &str = "job_type";

/// Batch id being recomputed.
pub const BATCH_ID: &str = "batch_id";

/// Worker id holding a claim.
pub const WORKER_ID: &str = "worker_id";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Attempt counter for retried operations.
pub const ATTEMPT: &str = "attempt";

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
