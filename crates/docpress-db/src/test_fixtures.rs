//! Shared fixtures for integration tests.
//!
//! In-memory databases are pinned to a single pooled connection; tests that
//! need real cross-connection contention use a file-backed database instead.

use std::path::Path;

use docpress_core::{CreateDocumentRequest, StoreConfig};

use crate::pool::{create_pool_with_config, PoolConfig};
use crate::{migrations, Database};

/// Open a fresh in-memory database with the schema applied.
pub async fn memory_db() -> Database {
    let store = StoreConfig::new(":memory:");
    Database::connect(&store)
        .await
        .expect("Failed to open in-memory database")
}

/// Open a file-backed database with the schema applied and a multi-connection
/// pool, for tests exercising concurrent writers.
pub async fn file_db(path: &Path, max_connections: u32) -> Database {
    let store = StoreConfig::new(path);
    let pool = create_pool_with_config(&store, PoolConfig::new().max_connections(max_connections))
        .await
        .expect("Failed to open file-backed database");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to apply migrations");
    Database::new(pool, None)
}

/// Pull a rescheduled job's next attempt forward so tests need not wait out
/// the real backoff.
pub async fn make_job_ready(db: &Database, job_id: &str) {
    sqlx::query("UPDATE jobs SET scheduled_at = ? WHERE id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::seconds(1))
        .bind(job_id)
        .execute(&db.pool)
        .await
        .expect("Failed to reset scheduled_at");
}

/// A minimal pending document request for queue tests.
pub fn sample_document(file_name: &str) -> CreateDocumentRequest {
    CreateDocumentRequest {
        file_name: file_name.to_string(),
        mime_type: "application/pdf".to_string(),
        file_size: 4096,
        blob_key: Some(format!("documents/{file_name}")),
        ..Default::default()
    }
}
