//! Centralized default constants for the docpress system.
//!
//! **This module is the single source of truth** for all shared default
//! values. The other crates reference these constants instead of defining
//! their own magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// WORKER POOL
// =============================================================================

/// Default number of workers in the pool.
pub const WORKER_COUNT: usize = 2;

/// Delay between successive worker constructions at startup, in milliseconds.
/// Staggered startup reduces initial write contention on the store.
pub const WORKER_START_STAGGER_MS: u64 = 100;

/// Default worker safety-net poll interval in milliseconds.
///
/// Workers normally wake on dispatcher signals; this interval only covers
/// missed signals, external SQL inserts, and crash-recovery edge cases.
pub const WORKER_POLL_INTERVAL_MS: u64 = 60_000;

/// Time the dispatcher waits for each worker's in-flight job during
/// shutdown, in seconds, before force-terminating the worker.
pub const SHUTDOWN_WAIT_PER_WORKER_SECS: u64 = 5;

/// Capacity of the bounded dispatcher-to-worker control channel.
pub const WORKER_CONTROL_CAPACITY: usize = 4;

/// Default worker event broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// DISPATCH & CLEANUP
// =============================================================================

/// Default queue-check dispatch tick in seconds.
pub const DISPATCH_INTERVAL_SECS: u64 = 5;

/// Default orphan-sweep cleanup tick in seconds.
pub const CLEANUP_INTERVAL_SECS: u64 = 60;

/// Age after which a processing job with no outcome counts as orphaned,
/// in seconds. This timeout is the only stuck-work detector; there are no
/// per-worker heartbeats.
pub const ORPHAN_THRESHOLD_SECS: u64 = 300;

// =============================================================================
// JOB RETRY POLICY
// =============================================================================

/// Default maximum claim attempts per job.
pub const JOB_MAX_ATTEMPTS: i64 = 3;

/// Base for the scheduled-failure backoff: a failed job is rescheduled at
/// `now + 2^attempts * RETRY_BACKOFF_BASE_SECS`. Retries of real conversion
/// work are expensive, hence the large base.
pub const RETRY_BACKOFF_BASE_SECS: i64 = 60;

/// Base for the orphan-recovery backoff: a reset orphan is rescheduled at
/// `now + 2^attempts * ORPHAN_RESET_BACKOFF_BASE_SECS`. Orphans never
/// produced an outcome, so they are re-admitted much sooner than scheduled
/// failures.
pub const ORPHAN_RESET_BACKOFF_BASE_SECS: i64 = 5;

/// Largest exponent applied to either backoff base. Caps the shift so the
/// arithmetic cannot overflow on pathological attempt counts.
pub const MAX_BACKOFF_SHIFT: i64 = 20;

/// Error text written to orphaned jobs (and their documents) that ran out of
/// attempts.
pub const ORPHAN_EXHAUSTED_ERROR: &str = "Max retry attempts exceeded (job timeout >5 minutes)";

// =============================================================================
// STORE WRITE RETRY
// =============================================================================

/// Attempts the write wrapper makes against a busy store.
pub const WRITE_RETRY_ATTEMPTS: u32 = 5;

/// First inter-attempt delay in milliseconds; doubles each attempt
/// (100, 200, 400, 800, 1600).
pub const WRITE_RETRY_BASE_DELAY_MS: u64 = 100;

/// Store busy-wait timeout in seconds, applied as a connection pragma.
pub const DB_BUSY_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// CONVERSION
// =============================================================================

/// Blob size above which the convert handler streams to a worker-local temp
/// file instead of fetching into memory (10 MiB).
pub const LARGE_FILE_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Tokens assumed per OCR page when estimating page counts from usage.
pub const PAGE_TOKENS: i64 = 1000;

/// Base conversion price in cents per estimated page.
pub const PAGE_COST_CENTS: i64 = 1;

/// Default margin rate applied on top of base cost, in integer percent.
pub const MARGIN_RATE_PERCENT: i64 = 30;

// =============================================================================
// RETENTION
// =============================================================================

/// Default document retention in days.
pub const RETENTION_DAYS_DEFAULT: i64 = 365;

/// Minimum accepted retention in days.
pub const RETENTION_DAYS_MIN: i64 = 1;

/// Maximum accepted retention in days.
pub const RETENTION_DAYS_MAX: i64 = 3650;

// =============================================================================
// STORE LAYOUT
// =============================================================================

/// Database file name under the data directory.
pub const DB_FILE_NAME: &str = "service.db";

/// Scratch subdirectory under the data directory for worker temp files.
pub const TEMP_DIR_NAME: &str = "tmp";
