//! docpress-daemon - embedding binary for the docpress conversion engine.
//!
//! Reads configuration from the environment, wires the filesystem blob store
//! and the HTTP OCR provider into the engine, and runs until interrupted.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docpress_core::{EngineConfig, Error};
use docpress_jobs::Engine;
use docpress_ocr::{HttpOcrProvider, OcrProvider};
use docpress_storage::FilesystemStore;

fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run() -> docpress_core::Result<()> {
    let config = EngineConfig::from_env();

    let store = Arc::new(FilesystemStore::new(config.data_dir.join("blobs")));
    if let Err(e) = store.validate().await {
        return Err(Error::Storage(format!("blob store validation failed: {e}")));
    }

    let ocr = HttpOcrProvider::from_env().ok_or_else(|| {
        Error::Config("DOCPRESS_OCR_URL is not set; no OCR provider available".to_string())
    })?;
    info!(model = ocr.model_name(), "OCR provider configured");

    let mut engine = Engine::init(config, store, Arc::new(ocr)).await?;
    engine.start().await;

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, draining workers");
    engine.stop().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    init_logging();
    if let Err(e) = run().await {
        error!(error = %e, "docpress-daemon exited with error");
        std::process::exit(1);
    }
}
