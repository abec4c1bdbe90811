//! HTTP client for a remote OCR model endpoint.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docpress_core::{Error, Result};

use crate::{OcrProvider, OcrResult, TokenUsage};

/// Default request timeout. OCR of large documents is slow.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default sampling temperature. Transcription wants determinism.
const DEFAULT_TEMPERATURE: f32 = 0.0;

/// Configuration for the OCR HTTP client.
#[derive(Debug, Clone)]
pub struct OcrClientConfig {
    /// Base URL of the provider's API.
    pub base_url: String,
    /// API key (None for local providers).
    pub api_key: Option<String>,
    /// Model slug to request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl OcrClientConfig {
    /// Config for a base URL and model with default temperature/timeout.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    /// Returns None if `DOCPRESS_OCR_URL` is not set.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `DOCPRESS_OCR_URL` | Provider base URL |
    /// | `DOCPRESS_OCR_MODEL` | Model slug (default `ocr-standard`) |
    /// | `DOCPRESS_OCR_API_KEY` | API key |
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var("DOCPRESS_OCR_URL").ok()?;
        if base_url.is_empty() {
            return None;
        }
        let model = std::env::var("DOCPRESS_OCR_MODEL")
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "ocr-standard".to_string());
        let mut config = Self::new(base_url, model);
        config.api_key = std::env::var("DOCPRESS_OCR_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        Some(config)
    }
}

#[derive(Serialize)]
struct ConvertRequest<'a> {
    model: &'a str,
    temperature: f32,
    document: ConvertDocument<'a>,
}

#[derive(Serialize)]
struct ConvertDocument<'a> {
    name: &'a str,
    mime_type: &'a str,
    /// Base64-encoded document bytes.
    data: String,
}

#[derive(Deserialize)]
struct ConvertResponse {
    pages: Vec<ConvertPage>,
    model: String,
    usage: ConvertUsage,
}

#[derive(Deserialize)]
struct ConvertPage {
    markdown: String,
}

#[derive(Deserialize)]
struct ConvertUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}

/// OCR provider speaking a JSON-over-HTTP conversion protocol.
pub struct HttpOcrProvider {
    config: OcrClientConfig,
    client: reqwest::Client,
}

impl HttpOcrProvider {
    /// Create a provider from config.
    pub fn new(config: OcrClientConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Create from environment variables; None when unconfigured.
    pub fn from_env() -> Option<Self> {
        OcrClientConfig::from_env().map(Self::new)
    }
}

#[async_trait]
impl OcrProvider for HttpOcrProvider {
    async fn convert(&self, data: &[u8], mime_type: &str, filename: &str) -> Result<OcrResult> {
        if data.is_empty() {
            return Err(Error::InvalidInput(
                "cannot convert an empty document".to_string(),
            ));
        }

        let request = ConvertRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            document: ConvertDocument {
                name: filename,
                mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(data),
            },
        };

        debug!(
            subsystem = "ocr",
            component = "http",
            model = %self.config.model,
            filename,
            size = data.len(),
            "Requesting conversion"
        );

        let url = format!("{}/v1/convert", self.config.base_url);
        let mut req = self
            .client
            .post(&url)
            .json(&request)
            .timeout(std::time::Duration::from_secs(self.config.timeout_secs));
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::Provider(format!("OCR request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "OCR API returned {status}: {body}"
            )));
        }

        let result: ConvertResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse OCR response: {e}")))?;

        if result.pages.is_empty() {
            return Err(Error::Provider(
                "OCR response contained no pages".to_string(),
            ));
        }

        Ok(OcrResult {
            pages: result.pages.into_iter().map(|p| p.markdown).collect(),
            model: result.model,
            temperature: self.config.temperature,
            usage: TokenUsage {
                prompt_tokens: result.usage.prompt_tokens,
                completion_tokens: result.usage.completion_tokens,
                total_tokens: result.usage.total_tokens,
            },
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/models", self.config.base_url);
        match self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OcrClientConfig::new("http://localhost:9000", "ocr-standard");
        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.model, "ocr-standard");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.timeout_secs, 300);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_model_name() {
        let provider =
            HttpOcrProvider::new(OcrClientConfig::new("http://localhost:9000", "ocr-large"));
        assert_eq!(provider.model_name(), "ocr-large");
    }

    #[tokio::test]
    async fn test_empty_document_rejected_before_network() {
        let provider =
            HttpOcrProvider::new(OcrClientConfig::new("http://localhost:9", "ocr-standard"));
        let result = provider.convert(b"", "application/pdf", "empty.pdf").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_convert_request_serialization() {
        let request = ConvertRequest {
            model: "ocr-standard",
            temperature: 0.0,
            document: ConvertDocument {
                name: "scan.pdf",
                mime_type: "application/pdf",
                data: "aGVsbG8=".to_string(),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "ocr-standard");
        assert_eq!(json["document"]["name"], "scan.pdf");
        assert_eq!(json["document"]["data"], "aGVsbG8=");
    }

    #[test]
    fn test_convert_response_deserialization() {
        let json = r##"{
            "pages": [{"markdown": "# Title"}, {"markdown": "body"}],
            "model": "ocr-standard",
            "usage": {"prompt_tokens": 1200, "completion_tokens": 300, "total_tokens": 1500}
        }"##;
        let response: ConvertResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.pages.len(), 2);
        assert_eq!(response.usage.total_tokens, 1500);
        assert_eq!(response.model, "ocr-standard");
    }
}
