//! # docpress-core
//!
//! Core types, traits, and abstractions for the docpress conversion service.
//!
//! This crate provides the foundational data structures, the error type, and
//! the configuration model that the other docpress crates depend on.

pub mod config;
pub mod defaults;
pub mod error;
pub mod ids;
pub mod logging;
pub mod models;

// Re-export commonly used types at crate root
pub use config::{EngineConfig, StoreConfig};
pub use error::{Error, Result};
pub use ids::new_id;
pub use models::*;
