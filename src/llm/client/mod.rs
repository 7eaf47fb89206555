//! LLM client for text analysis.
//!
//! Supports the Ollama `/api/generate` endpoint for local inference.

mod config;
mod retry;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use config::LlmConfig;
pub use retry::{RetryPolicy, RetryingGenerator};

/// A backend that turns a rendered prompt into generated text.
///
/// Implementations send exactly one request per call and never retry;
/// wrap them in [`RetryingGenerator`] for bounded retries.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Errors that can occur during a generation call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Failed to connect to the generation service
    #[error("generation backend unavailable at {endpoint}: {message}")]
    BackendUnavailable { endpoint: String, message: String },
    /// The request did not complete within its deadline
    #[error("generation request timed out after {0:?}")]
    Timeout(Duration),
    /// The backend answered with a non-success status
    #[error("generation backend returned HTTP {status}: {body}")]
    BackendError { status: u16, body: String },
    /// The backend answered successfully but without the expected output
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// Whether the failure is transient (connection could not be made).
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::BackendUnavailable { .. })
    }
}

/// Ollama API request format.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub num_ctx: u32,
    pub num_thread: u32,
}

impl GenerationRequest {
    /// Build a fresh non-streaming request for one prompt.
    pub fn new(config: &LlmConfig, prompt: &str) -> Self {
        Self {
            model: config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: GenerationOptions {
                temperature: config.temperature,
                num_ctx: config.num_ctx,
                num_thread: config.num_thread,
            },
        }
    }
}

/// LLM client for the Ollama generate API.
pub struct LlmClient {
    config: LlmConfig,
    client: Client,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { config, client })
    }

    /// Get the config.
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.endpoint.trim_end_matches('/'), path)
    }

    /// Check if the LLM service is available.
    pub async fn is_available(&self) -> bool {
        match self.client.get(self.url("/api/tags")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// List available models.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let resp = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::BackendError { status, body });
        }

        #[derive(Deserialize)]
        struct TagsResponse {
            models: Vec<ModelInfo>,
        }

        #[derive(Deserialize)]
        struct ModelInfo {
            name: String,
        }

        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| self.body_error(e))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Classify a failure while sending the request.
    fn transport_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.config.timeout())
        } else {
            LlmError::BackendUnavailable {
                endpoint: self.config.endpoint.clone(),
                message: err.to_string(),
            }
        }
    }

    /// Classify a failure while reading a response that has already started.
    ///
    /// The backend accepted the request, so this is never a connection failure.
    fn body_error(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.config.timeout())
        } else {
            LlmError::MalformedResponse(format!("failed to read response body: {}", err))
        }
    }

    /// Call Ollama API with a prompt.
    async fn call_ollama(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GenerationRequest::new(&self.config, prompt);

        debug!(
            "Calling {} with model {} ({} prompt chars)",
            self.config.endpoint,
            request.model,
            prompt.chars().count()
        );

        let resp = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.body_error(e))?;

        if !status.is_success() {
            return Err(LlmError::BackendError {
                status: status.as_u16(),
                body,
            });
        }

        extract_response_text(&body)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.call_ollama(prompt).await
    }
}

/// Pull the trimmed `response` string out of an Ollama reply body.
fn extract_response_text(body: &str) -> Result<String, LlmError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse(format!("body is not JSON: {}", e)))?;

    value
        .get("response")
        .and_then(serde_json::Value::as_str)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| {
            LlmError::MalformedResponse("missing string field 'response'".to_string())
        })
}
