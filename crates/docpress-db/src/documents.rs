//! Document repository.

use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::debug;

use docpress_core::{
    defaults, new_id, CreateDocumentRequest, Document, DocumentStatus, Error, Result,
};

use crate::retry::with_write_retry;

const DOCUMENT_COLUMNS: &str = "id, file_name, mime_type, file_size, blob_key, content, metadata, \
     status, error, retention_days, user_id, api_key_id, batch_id, \
     created_at, processed_at, archived_at";

/// Parse a document row into a Document struct.
pub(crate) fn document_from_row(row: &SqliteRow) -> Result<Document> {
    Ok(Document {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        mime_type: row.try_get("mime_type")?,
        file_size: row.try_get("file_size")?,
        blob_key: row.try_get("blob_key")?,
        content: row.try_get("content")?,
        metadata: row.try_get::<Json<JsonValue>, _>("metadata")?.0,
        status: DocumentStatus::parse(&row.try_get::<String, _>("status")?),
        error: row.try_get("error")?,
        retention_days: row.try_get("retention_days")?,
        user_id: row.try_get("user_id")?,
        api_key_id: row.try_get("api_key_id")?,
        batch_id: row.try_get("batch_id")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
        archived_at: row.try_get("archived_at")?,
    })
}

/// SQLite implementation of the document repository.
pub struct SqliteDocumentRepository {
    pool: SqlitePool,
    read_pool: SqlitePool,
}

impl SqliteDocumentRepository {
    /// Create a repository over a write pool and a read pool (which may be
    /// the same pool when no replica is configured).
    pub fn new(pool: SqlitePool, read_pool: SqlitePool) -> Self {
        Self { pool, read_pool }
    }

    /// Insert a new document in status pending. The id is assigned here.
    pub async fn create(&self, req: &CreateDocumentRequest) -> Result<String> {
        if let Some(days) = req.retention_days {
            if !(defaults::RETENTION_DAYS_MIN..=defaults::RETENTION_DAYS_MAX).contains(&days) {
                return Err(Error::InvalidInput(format!(
                    "retention_days {} outside {}..{}",
                    days,
                    defaults::RETENTION_DAYS_MIN,
                    defaults::RETENTION_DAYS_MAX
                )));
            }
        }

        let id = new_id();
        let retention_days = req.retention_days.unwrap_or(defaults::RETENTION_DAYS_DEFAULT);
        let metadata = req
            .metadata
            .clone()
            .unwrap_or_else(|| JsonValue::Object(Default::default()));

        with_write_retry("create_document", || async {
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO documents (id, file_name, mime_type, file_size, blob_key, metadata, \
                 status, retention_days, user_id, api_key_id, batch_id, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&req.file_name)
            .bind(&req.mime_type)
            .bind(req.file_size)
            .bind(&req.blob_key)
            .bind(Json(&metadata))
            .bind(retention_days)
            .bind(&req.user_id)
            .bind(&req.api_key_id)
            .bind(&req.batch_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await?;

        Ok(id)
    }

    /// Get a document by id.
    ///
    /// Served from the read pool; the pool's persistent statement cache makes
    /// this the prepared hot-path read.
    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.read_pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(document_from_row).transpose()
    }

    /// Transition a document from pending to processing on behalf of a
    /// claiming worker.
    ///
    /// Only a pending document may enter processing: a row already held by
    /// another claim, or already terminal, is rejected. Retryable failures
    /// and orphan resets return the document to pending first, so the
    /// surviving job's next claim passes this gate.
    pub async fn mark_processing(&self, id: &str) -> Result<()> {
        with_write_retry("mark_document_processing", || async {
            let result = sqlx::query(
                "UPDATE documents SET status = 'processing' \
                 WHERE id = ? AND status = 'pending'",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            if result.rows_affected() == 0 {
                let exists: Option<(String,)> =
                    sqlx::query_as("SELECT status FROM documents WHERE id = ?")
                        .bind(id)
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(Error::Database)?;
                return match exists {
                    None => Err(Error::DocumentNotFound(id.to_string())),
                    Some((status,)) => Err(Error::InvalidState(format!(
                        "document {} is {} and cannot enter processing",
                        id, status
                    ))),
                };
            }
            Ok(())
        })
        .await
    }

    /// Return a document from processing to pending ahead of a retry.
    ///
    /// Used when its job is rescheduled by the failure backoff, so the next
    /// claim can re-enter processing. Documents in any other state are left
    /// untouched.
    pub async fn reset_to_pending(&self, id: &str) -> Result<()> {
        with_write_retry("reset_document_to_pending", || async {
            sqlx::query(
                "UPDATE documents SET status = 'pending' \
                 WHERE id = ? AND status = 'processing'",
            )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
            Ok(())
        })
        .await
    }

    /// Best-effort transition to failed with an error text.
    ///
    /// Terminal documents are left untouched; callers use this on error paths
    /// where the job row's terminal write is authoritative.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        with_write_retry("mark_document_failed", || async {
            let result = sqlx::query(
                "UPDATE documents SET status = 'failed', error = ? \
                 WHERE id = ? AND status NOT IN ('completed', 'archived')",
            )
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

            if result.rows_affected() == 0 {
                debug!(
                    subsystem = "db",
                    component = "documents",
                    document_id = id,
                    "mark_failed skipped terminal or missing document"
                );
            }
            Ok(())
        })
        .await
    }

    /// Mark completed documents past their retention window as archived.
    ///
    /// Returns the number of documents archived. This is retention
    /// bookkeeping only; blob relocation happens through explicit archive
    /// jobs.
    pub async fn archive_old_documents(&self) -> Result<u64> {
        with_write_retry("archive_old_documents", || async {
            let now = Utc::now();
            let rows: Vec<(String, chrono::DateTime<Utc>, i64)> = sqlx::query_as(
                "SELECT id, created_at, retention_days FROM documents \
                 WHERE status = 'completed' AND archived_at IS NULL",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

            let expired: Vec<String> = rows
                .into_iter()
                .filter(|(_, created_at, retention_days)| {
                    *created_at + chrono::Duration::days(*retention_days) <= now
                })
                .map(|(id, _, _)| id)
                .collect();

            if expired.is_empty() {
                return Ok(0);
            }

            let mut tx = self.pool.begin().await.map_err(Error::Database)?;
            let mut archived = 0;
            for id in &expired {
                let result = sqlx::query(
                    "UPDATE documents SET status = 'archived', archived_at = ? \
                     WHERE id = ? AND status = 'completed'",
                )
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                archived += result.rows_affected();
            }
            tx.commit().await.map_err(Error::Database)?;

            Ok(archived)
        })
        .await
    }

    /// List the documents belonging to a batch, in submission order.
    pub async fn list_for_batch(&self, batch_id: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE batch_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(batch_id)
        .fetch_all(&self.read_pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(document_from_row).collect()
    }
}
