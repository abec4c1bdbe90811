//! ArchiveHandler — relocates a completed document's blob to the archive
//! prefix and marks the document archived.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::info;

use docpress_core::{DocumentStatus, Error, JobCompletion, JobType, Result};
use docpress_db::Database;
use docpress_storage::{archive_key, ObjectStore};

use crate::handler::{JobContext, JobHandler, JobResult};

pub struct ArchiveHandler {
    db: Database,
    store: Arc<dyn ObjectStore>,
}

impl ArchiveHandler {
    pub fn new(db: Database, store: Arc<dyn ObjectStore>) -> Self {
        Self { db, store }
    }

    async fn run(&self, ctx: &JobContext) -> Result<()> {
        let job = &ctx.job;

        let Some(doc) = self.db.documents.get(&job.document_id).await? else {
            return Err(Error::DocumentNotFound(job.document_id.clone()));
        };
        if doc.status != DocumentStatus::Completed {
            return Err(Error::InvalidState(format!(
                "cannot archive document {} in status {}",
                doc.id, doc.status
            )));
        }
        let original_key = doc.blob_key.clone().ok_or_else(|| {
            Error::InvalidInput(format!("document {} has no blob key", doc.id))
        })?;

        // Move = copy then delete; the copy is verified by the backend before
        // the original disappears.
        let destination = archive_key(&original_key);
        self.store.copy(&original_key, &destination).await?;
        self.store.delete(&original_key).await?;

        let mut metadata = if doc.metadata.is_object() {
            doc.metadata.clone()
        } else {
            JsonValue::Object(Default::default())
        };
        if let Some(map) = metadata.as_object_mut() {
            map.insert("original_key".to_string(), json!(&original_key));
            map.insert("archive_key".to_string(), json!(&destination));
        }

        self.db
            .jobs
            .complete_job_and_document(&job.id, &doc.id, &JobCompletion::Archived { metadata })
            .await?;

        info!(
            subsystem = "jobs",
            component = "archive",
            job_id = %job.id,
            document_id = %doc.id,
            archive_key = %destination,
            "Document archived"
        );
        Ok(())
    }
}

#[async_trait]
impl JobHandler for ArchiveHandler {
    fn job_type(&self) -> JobType {
        JobType::Archive
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        match self.run(&ctx).await {
            Ok(()) => JobResult::Completed,
            Err(e @ Error::DocumentNotFound(_)) => JobResult::FailedTerminal(e.to_string()),
            // Archiving a non-completed document violates the lifecycle DAG.
            Err(e @ Error::InvalidState(_)) => JobResult::FailedTerminal(e.to_string()),
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}
