//! # docpress-jobs
//!
//! Job execution engine for docpress.
//!
//! This crate provides:
//! - Typed job handlers (convert, archive) over injected collaborators
//! - Single-threaded workers claiming one job at a time
//! - A dispatcher owning the pool, the dispatch tick, and the cleanup tick
//! - The `Engine` facade with an `init → start → stop` lifecycle
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docpress_core::EngineConfig;
//! use docpress_jobs::Engine;
//! use docpress_ocr::HttpOcrProvider;
//! use docpress_storage::FilesystemStore;
//!
//! let config = EngineConfig::from_env();
//! let store = Arc::new(FilesystemStore::new("/data/blobs"));
//! let ocr = Arc::new(HttpOcrProvider::from_env().expect("OCR unconfigured"));
//!
//! let mut engine = Engine::init(config, store, ocr).await?;
//! engine.start().await;
//! // ...
//! engine.stop().await;
//! ```

pub mod archive;
pub mod convert;
pub mod dispatcher;
pub mod engine;
pub mod handler;
pub mod worker;

// Re-export core types
pub use docpress_core::*;

pub use archive::ArchiveHandler;
pub use convert::ConvertHandler;
pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use handler::{JobContext, JobHandler, JobResult};
pub use worker::{Worker, WorkerEvent, WorkerMessage};
