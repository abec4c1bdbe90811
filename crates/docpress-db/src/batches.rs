//! Batch repository.
//!
//! Batch progress is a derived projection: completed/failed counts and the
//! batch status are recomputed from child documents on each terminal child
//! event, never incremented in place.

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::debug;

use docpress_core::{new_id, Batch, BatchStatus, CreateBatchRequest, Error, Result};

use crate::retry::with_write_retry;

const BATCH_COLUMNS: &str = "id, user_id, api_key_id, total_documents, completed_documents, \
     failed_documents, status, priority, metadata, created_at, completed_at";

/// Parse a batch row into a Batch struct.
pub(crate) fn batch_from_row(row: &SqliteRow) -> Result<Batch> {
    Ok(Batch {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        api_key_id: row.try_get("api_key_id")?,
        total_documents: row.try_get("total_documents")?,
        completed_documents: row.try_get("completed_documents")?,
        failed_documents: row.try_get("failed_documents")?,
        status: BatchStatus::parse(&row.try_get::<String, _>("status")?),
        priority: row.try_get("priority")?,
        metadata: row.try_get::<Json<JsonValue>, _>("metadata")?.0,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

/// SQLite implementation of the batch repository.
pub struct SqliteBatchRepository {
    pool: SqlitePool,
    read_pool: SqlitePool,
}

impl SqliteBatchRepository {
    /// Create a repository over a write pool and a read pool (which may be
    /// the same pool when no replica is configured).
    pub fn new(pool: SqlitePool, read_pool: SqlitePool) -> Self {
        Self { pool, read_pool }
    }

    /// Insert a new batch in status pending.
    pub async fn create(&self, req: &CreateBatchRequest) -> Result<String> {
        if req.total_documents < 0 {
            return Err(Error::InvalidInput(
                "total_documents must be non-negative".to_string(),
            ));
        }

        let id = new_id();
        let metadata = req
            .metadata
            .clone()
            .unwrap_or_else(|| JsonValue::Object(Default::default()));

        with_write_retry("create_batch", || async {
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO batches (id, user_id, api_key_id, total_documents, status, \
                 priority, metadata, created_at) VALUES (?, ?, ?, ?, 'pending', ?, ?, ?)",
            )
            .bind(&id)
            .bind(&req.user_id)
            .bind(&req.api_key_id)
            .bind(req.total_documents)
            .bind(req.priority.unwrap_or(0))
            .bind(Json(&metadata))
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    /// Get a batch by id.
    pub async fn get(&self, id: &str) -> Result<Option<Batch>> {
        let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.read_pool)
            .await
            .map_err(Error::Database)?;

        row.as_ref().map(batch_from_row).transpose()
    }

    /// List batches, most recent first.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Batch>> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches ORDER BY created_at DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.read_pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(batch_from_row).collect()
    }

    /// Recompute a batch's progress by counting child documents.
    ///
    /// Stamps completed_at exactly once, on the transition into a terminal
    /// status. Archived children count as completed: archival happens only
    /// after successful conversion.
    pub async fn update_progress(&self, batch_id: &str) -> Result<()> {
        with_write_retry("update_batch_progress", || async {
            let now = Utc::now();
            let mut tx = self.pool.begin().await.map_err(Error::Database)?;

            let batch: Option<(i64, String, Option<DateTime<Utc>>)> = sqlx::query_as(
                "SELECT total_documents, status, completed_at FROM batches WHERE id = ?",
            )
            .bind(batch_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Error::Database)?;

            let Some((total, old_status, completed_at)) = batch else {
                return Err(Error::BatchNotFound(batch_id.to_string()));
            };
            let old_status = BatchStatus::parse(&old_status);

            let (completed, failed): (i64, i64) = sqlx::query_as(
                "SELECT \
                    COUNT(*) FILTER (WHERE status IN ('completed', 'archived')), \
                    COUNT(*) FILTER (WHERE status = 'failed') \
                 FROM documents WHERE batch_id = ?",
            )
            .bind(batch_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(Error::Database)?;

            let new_status = BatchStatus::derive(total, completed, failed);
            let completed_at = match (completed_at, new_status.is_terminal()) {
                (Some(existing), _) => Some(existing),
                (None, true) => Some(now),
                (None, false) => None,
            };

            sqlx::query(
                "UPDATE batches SET completed_documents = ?, failed_documents = ?, \
                 status = ?, completed_at = ? WHERE id = ?",
            )
            .bind(completed)
            .bind(failed)
            .bind(new_status.as_str())
            .bind(completed_at)
            .bind(batch_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            tx.commit().await.map_err(Error::Database)?;

            if old_status != new_status {
                debug!(
                    subsystem = "db",
                    component = "batches",
                    batch_id,
                    from = %old_status,
                    to = %new_status,
                    completed,
                    failed,
                    total,
                    "Batch progress recomputed"
                );
            }
            Ok(())
        })
        .await
    }
}
