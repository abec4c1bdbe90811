//! # docpress-db
//!
//! SQLite store layer for docpress.
//!
//! This crate provides:
//! - Connection pool setup (WAL journaling, busy-wait timeout, normal
//!   synchronous durability, in-memory temp store)
//! - Embedded SQL schema migrations
//! - Bounded-retry write wrapper absorbing transient busy/locked errors
//! - Repository implementations for documents, jobs, batches, and usage
//!
//! ## Example
//!
//! ```rust,ignore
//! use docpress_db::Database;
//! use docpress_core::{CreateDocumentRequest, StoreConfig};
//!
//! let db = Database::connect(&StoreConfig::new("/data/service.db")).await?;
//! let id = db.documents.create(&CreateDocumentRequest {
//!     file_name: "scan.pdf".to_string(),
//!     mime_type: "application/pdf".to_string(),
//!     ..Default::default()
//! }).await?;
//! ```

pub mod batches;
pub mod documents;
pub mod jobs;
pub mod migrations;
pub mod pool;
pub mod retry;
pub mod usage;

// Test fixtures for integration tests.
// Always compiled so integration tests (in tests/) can build databases.
pub mod test_fixtures;

// Re-export core types
pub use docpress_core::*;

pub use batches::SqliteBatchRepository;
pub use documents::SqliteDocumentRepository;
pub use jobs::{orphan_reset_backoff, retry_backoff, OrphanSweep, SqliteJobRepository};
pub use migrations::run_migrations;
pub use pool::{create_pool, create_pool_with_config, create_read_pool, PoolConfig};
pub use retry::with_write_retry;
pub use usage::SqliteUsageRepository;

use sqlx::sqlite::SqlitePool;
use tracing::{info, warn};

/// Combined database context with all repositories.
pub struct Database {
    /// The primary (write) connection pool.
    pub pool: SqlitePool,
    /// Optional read-only replica pool for hot reads.
    read_pool: Option<SqlitePool>,
    /// Document repository.
    pub documents: SqliteDocumentRepository,
    /// Job queue repository.
    pub jobs: SqliteJobRepository,
    /// Batch repository.
    pub batches: SqliteBatchRepository,
    /// Usage/cost repository.
    pub usage: SqliteUsageRepository,
}

impl Database {
    /// Build a Database from existing pools.
    pub fn new(pool: SqlitePool, read_pool: Option<SqlitePool>) -> Self {
        let read = read_pool.clone().unwrap_or_else(|| pool.clone());
        Self {
            documents: SqliteDocumentRepository::new(pool.clone(), read.clone()),
            jobs: SqliteJobRepository::new(pool.clone(), read.clone()),
            batches: SqliteBatchRepository::new(pool.clone(), read.clone()),
            usage: SqliteUsageRepository::new(pool.clone(), read),
            read_pool,
            pool,
        }
    }

    /// Open the store described by the config and apply migrations.
    pub async fn connect(store: &StoreConfig) -> Result<Self> {
        let pool = create_pool(store).await?;
        migrations::run_migrations(&pool).await?;
        let read_pool = create_read_pool(store).await?;
        Ok(Self::new(pool, read_pool))
    }

    /// The pool serving reads (replica when configured, primary otherwise).
    pub fn read_pool(&self) -> &SqlitePool {
        self.read_pool.as_ref().unwrap_or(&self.pool)
    }

    /// Run the orphan sweep and recompute progress for every affected batch.
    ///
    /// Returns the number of stuck jobs processed. Batch recomputation
    /// failures are logged and swallowed: the sweep's job/document writes are
    /// authoritative and the next terminal child event recomputes again.
    pub async fn cleanup_orphaned_jobs(&self, threshold: std::time::Duration) -> Result<usize> {
        let sweep = self.jobs.cleanup_orphaned_jobs(threshold).await?;
        for batch_id in &sweep.affected_batches {
            if let Err(e) = self.batches.update_progress(batch_id).await {
                warn!(
                    subsystem = "db",
                    component = "jobs",
                    batch_id = %batch_id,
                    error = %e,
                    "Batch recompute after orphan sweep failed"
                );
            }
        }
        if sweep.processed > 0 {
            info!(
                subsystem = "db",
                component = "jobs",
                op = "cleanup_orphaned_jobs",
                processed = sweep.processed,
                "Recovered orphaned jobs"
            );
        }
        Ok(sweep.processed)
    }

    /// Close all pools. The caller is responsible for stopping writers first.
    pub async fn close(&self) {
        if let Some(read_pool) = &self.read_pool {
            read_pool.close().await;
        }
        self.pool.close().await;
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone(), self.read_pool.clone())
    }
}
