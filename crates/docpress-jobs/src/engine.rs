//! Engine — the single value owning the store, the queue, and the
//! dispatcher. All collaborators are injected; there are no globals.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use docpress_core::{EngineConfig, Result};
use docpress_db::Database;
use docpress_ocr::OcrProvider;
use docpress_storage::ObjectStore;

use crate::dispatcher::Dispatcher;
use crate::worker::WorkerEvent;

/// The conversion engine. Lifecycle: `init(config, ...) → start() → stop()`.
pub struct Engine {
    db: Database,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Open the store (applying migrations), prepare the scratch directory,
    /// and wire the dispatcher to the injected collaborators.
    pub async fn init(
        config: EngineConfig,
        store: Arc<dyn ObjectStore>,
        ocr: Arc<dyn OcrProvider>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        tokio::fs::create_dir_all(config.temp_dir()).await?;

        let db = Database::connect(&config.store).await?;
        let dispatcher = Dispatcher::new(config, db.clone(), store, ocr);

        Ok(Self { db, dispatcher })
    }

    /// The shared database handle, for the submission side and for tests.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.dispatcher.events()
    }

    /// Start the worker pool and timers.
    pub async fn start(&mut self) {
        self.dispatcher.start().await;
        info!(subsystem = "jobs", component = "engine", "Engine running");
    }

    /// Graceful shutdown: drain the pool, then close the store last.
    pub async fn stop(mut self) {
        self.dispatcher.stop().await;
        self.db.close().await;
        info!(subsystem = "jobs", component = "engine", "Engine stopped");
    }
}
