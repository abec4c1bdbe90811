//! # docpress-ocr
//!
//! OCR provider seam for docpress.
//!
//! The engine consumes the [`OcrProvider`] trait: a full result (Markdown
//! pages plus token usage) or an error, never partials. [`HttpOcrProvider`]
//! talks to a remote model endpoint; [`MockOcrProvider`] serves deterministic
//! results for tests.

mod http;
pub mod mock;

pub use http::{HttpOcrProvider, OcrClientConfig};
pub use mock::MockOcrProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use docpress_core::Result;

/// Token usage reported by the provider for one conversion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

/// Result of one document conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    /// Converted Markdown, one entry per extracted page.
    pub pages: Vec<String>,
    /// Model that produced the result.
    pub model: String,
    /// Sampling temperature used for the request.
    pub temperature: f32,
    /// Token usage for cost accounting.
    pub usage: TokenUsage,
}

impl OcrResult {
    /// The document's full Markdown, pages joined by blank lines.
    pub fn markdown(&self) -> String {
        self.pages.join("\n\n")
    }

    /// Number of extracted pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Backend for converting documents to Markdown via an external model.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    /// Convert a document. Returns a full result or fails; partial results
    /// are not tolerated.
    async fn convert(&self, data: &[u8], mime_type: &str, filename: &str) -> Result<OcrResult>;

    /// Check if the provider is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}
