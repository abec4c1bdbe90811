//! ConvertHandler — converts a document to Markdown via the OCR provider.
//!
//! Large blobs are streamed to a worker-local temp file first; the temp file
//! is removed on every exit path. The terminal write (job completed +
//! document completed with content) is one transaction; the usage row and
//! batch recompute follow it and are non-fatal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info, warn};

use docpress_core::{EngineConfig, Error, JobCompletion, JobType, Result};
use docpress_db::Database;
use docpress_ocr::OcrProvider;
use docpress_storage::ObjectStore;

use crate::handler::{JobContext, JobHandler, JobResult};

/// Removes the temp file when the conversion leaves scope, on every exit path.
struct TempFileGuard {
    path: PathBuf,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct ConvertHandler {
    db: Database,
    store: Arc<dyn ObjectStore>,
    ocr: Arc<dyn OcrProvider>,
    config: EngineConfig,
}

impl ConvertHandler {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        ocr: Arc<dyn OcrProvider>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            db,
            store,
            ocr,
            config: config.clone(),
        }
    }

    /// Fetch the blob, spilling to a worker-local temp file above the size
    /// threshold. Returns the bytes, whether a temp file was used, and the
    /// guard keeping the temp path alive until conversion ends.
    async fn fetch_blob(
        &self,
        document_id: &str,
        blob_key: &str,
        size: u64,
    ) -> Result<(Vec<u8>, bool, Option<TempFileGuard>)> {
        if size <= self.config.large_file_threshold {
            let data = self.store.get(blob_key).await?;
            return Ok((data, false, None));
        }

        tokio::fs::create_dir_all(self.config.temp_dir()).await?;
        let path = self
            .config
            .temp_file_path(document_id, Utc::now().timestamp_millis());
        let guard = TempFileGuard::new(path.clone());

        debug!(
            subsystem = "jobs",
            component = "convert",
            document_id,
            size,
            temp_path = %path.display(),
            "Streaming large blob to temp file"
        );
        self.store.get_to_path(blob_key, &path).await?;
        let data = tokio::fs::read(&path).await?;
        Ok((data, true, Some(guard)))
    }

    async fn run(&self, ctx: &JobContext) -> Result<()> {
        let job = &ctx.job;
        let started = Instant::now();

        let Some(doc) = self.db.documents.get(&job.document_id).await? else {
            return Err(Error::DocumentNotFound(job.document_id.clone()));
        };
        let blob_key = doc.blob_key.clone().ok_or_else(|| {
            Error::InvalidInput(format!("document {} has no blob key", doc.id))
        })?;

        self.db.documents.mark_processing(&doc.id).await?;

        let meta = self.store.stat(&blob_key).await?;
        let (data, used_temp, _temp_guard) =
            self.fetch_blob(&doc.id, &blob_key, meta.size).await?;

        let ocr = self
            .ocr
            .convert(&data, &doc.mime_type, &doc.file_name)
            .await?;
        drop(data);

        let processing_time_ms = started.elapsed().as_millis() as i64;

        let mut metadata = if doc.metadata.is_object() {
            doc.metadata.clone()
        } else {
            JsonValue::Object(Default::default())
        };
        if let Some(map) = metadata.as_object_mut() {
            map.insert("model".to_string(), json!(ocr.model));
            map.insert("extracted_pages".to_string(), json!(ocr.page_count()));
            map.insert(
                "processing_time_ms".to_string(),
                json!(processing_time_ms),
            );
            map.insert("blob_size".to_string(), json!(meta.size));
            map.insert("used_temp_file".to_string(), json!(used_temp));
        }

        let completion = JobCompletion::Succeeded {
            content: ocr.markdown(),
            metadata,
            result: Some(json!({
                "model": ocr.model,
                "prompt_tokens": ocr.usage.prompt_tokens,
                "completion_tokens": ocr.usage.completion_tokens,
                "total_tokens": ocr.usage.total_tokens,
            })),
        };
        self.db
            .jobs
            .complete_job_and_document(&job.id, &doc.id, &completion)
            .await?;

        // The terminal write above is authoritative; usage and batch progress
        // are secondary and must not fail the job after the fact.
        if let Err(e) = self
            .db
            .usage
            .record_conversion(
                &doc.id,
                ocr.usage.prompt_tokens,
                ocr.usage.completion_tokens,
                ocr.usage.total_tokens,
            )
            .await
        {
            warn!(
                subsystem = "jobs",
                component = "convert",
                document_id = %doc.id,
                error = %e,
                "Usage record write failed"
            );
        }
        if let Some(batch_id) = &doc.batch_id {
            if let Err(e) = self.db.batches.update_progress(batch_id).await {
                warn!(
                    subsystem = "jobs",
                    component = "convert",
                    batch_id = %batch_id,
                    error = %e,
                    "Batch recompute failed"
                );
            }
        }

        info!(
            subsystem = "jobs",
            component = "convert",
            job_id = %job.id,
            document_id = %doc.id,
            pages = ocr.page_count(),
            duration_ms = processing_time_ms,
            used_temp_file = used_temp,
            "Document converted"
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ConvertHandler {
    fn job_type(&self) -> JobType {
        JobType::Convert
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        match self.run(&ctx).await {
            Ok(()) => JobResult::Completed,
            // A missing document row cannot heal; don't burn the retry budget.
            Err(e @ Error::DocumentNotFound(_)) => JobResult::FailedTerminal(e.to_string()),
            Err(e @ Error::InvalidState(_)) => JobResult::FailedTerminal(e.to_string()),
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}
