//! Mock OCR provider for deterministic testing.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let provider = MockOcrProvider::new()
//!     .with_pages(vec!["# Page 1".to_string()])
//!     .with_total_tokens(1500)
//!     .with_failures(2, "provider timeout");
//!
//! // First two convert() calls fail, later calls return the fixed pages.
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use docpress_core::{Error, Result};

use crate::{OcrProvider, OcrResult, TokenUsage};

/// One recorded call to the mock.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub filename: String,
    pub mime_type: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
struct MockConfig {
    pages: Vec<String>,
    model: String,
    prompt_tokens: i64,
    completion_tokens: i64,
    latency_ms: u64,
    failures: usize,
    failure_message: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            pages: vec!["# Mock conversion\n\nExtracted text.".to_string()],
            model: "ocr-mock".to_string(),
            prompt_tokens: 1000,
            completion_tokens: 500,
            latency_ms: 0,
            failures: 0,
            failure_message: "mock provider failure".to_string(),
        }
    }
}

/// Mock OCR provider for testing.
#[derive(Clone)]
pub struct MockOcrProvider {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    calls: Arc<AtomicUsize>,
}

impl Default for MockOcrProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOcrProvider {
    /// Create a mock with default pages and usage.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the Markdown pages every successful call returns.
    pub fn with_pages(mut self, pages: Vec<String>) -> Self {
        Arc::make_mut(&mut self.config).pages = pages;
        self
    }

    /// Set the reported token usage split.
    pub fn with_tokens(mut self, prompt_tokens: i64, completion_tokens: i64) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.prompt_tokens = prompt_tokens;
        config.completion_tokens = completion_tokens;
        self
    }

    /// Set the reported total by splitting it two-thirds prompt, rest
    /// completion.
    pub fn with_total_tokens(mut self, total: i64) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.prompt_tokens = total * 2 / 3;
        config.completion_tokens = total - config.prompt_tokens;
        self
    }

    /// Simulate conversion latency.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Fail the first `n` convert calls with the given message.
    pub fn with_failures(mut self, n: usize, message: impl Into<String>) -> Self {
        let config = Arc::make_mut(&mut self.config);
        config.failures = n;
        config.failure_message = message.into();
        self
    }

    /// All recorded convert calls.
    pub fn calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Number of convert calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrProvider for MockOcrProvider {
    async fn convert(&self, data: &[u8], mime_type: &str, filename: &str) -> Result<OcrResult> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().unwrap().push(MockCall {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            size: data.len(),
        });

        if self.config.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.config.latency_ms)).await;
        }

        if call_index < self.config.failures {
            return Err(Error::Provider(self.config.failure_message.clone()));
        }

        Ok(OcrResult {
            pages: self.config.pages.clone(),
            model: self.config.model.clone(),
            temperature: 0.0,
            usage: TokenUsage {
                prompt_tokens: self.config.prompt_tokens,
                completion_tokens: self.config.completion_tokens,
                total_tokens: self.config.prompt_tokens + self.config.completion_tokens,
            },
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
