//! Generation backend configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::RetryPolicy;

/// Configuration for the generation client.
///
/// Sampling options are fixed for the lifetime of a client so that every
/// call within one analysis run uses the same settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama API endpoint (default: http://localhost:11434)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Model used for every analysis stage
    #[serde(default = "default_model")]
    pub model: String,
    /// Temperature for generation (kept low for reproducible output)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Context window size passed as `num_ctx`
    #[serde(default = "default_num_ctx")]
    pub num_ctx: u32,
    /// Thread hint passed as `num_thread`
    #[serde(default = "default_num_thread")]
    pub num_thread: u32,
    /// HTTP timeout for a single generation request
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries after a connection failure (0 = never retry)
    #[serde(default)]
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "tinyllama".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_num_ctx() -> u32 {
    2048
}

fn default_num_thread() -> u32 {
    4
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            num_ctx: default_num_ctx(),
            num_thread: default_num_thread(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl LlmConfig {
    /// Check if the config equals the default (for skip_serializing_if).
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `LLM_ENDPOINT`: API endpoint
    /// - `LLM_MODEL`: Model name
    /// - `LLM_TEMPERATURE`: Generation temperature
    /// - `LLM_NUM_CTX`: Context window size
    /// - `LLM_NUM_THREAD`: Thread hint
    /// - `LLM_TIMEOUT_SECS`: Per-request HTTP timeout
    /// - `LLM_MAX_RETRIES`: Retries after connection failures
    ///
    /// Values that fail to parse are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Apply the `LLM_*` overrides, reading variables through `lookup`.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("LLM_ENDPOINT") {
            self.endpoint = val;
        }
        if let Some(val) = lookup("LLM_MODEL") {
            self.model = val;
        }
        if let Some(t) = lookup("LLM_TEMPERATURE").and_then(|v| v.parse().ok()) {
            self.temperature = t;
        }
        if let Some(n) = lookup("LLM_NUM_CTX").and_then(|v| v.parse().ok()) {
            self.num_ctx = n;
        }
        if let Some(n) = lookup("LLM_NUM_THREAD").and_then(|v| v.parse().ok()) {
            self.num_thread = n;
        }
        if let Some(n) = lookup("LLM_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.timeout_secs = n;
        }
        if let Some(n) = lookup("LLM_MAX_RETRIES").and_then(|v| v.parse().ok()) {
            self.max_retries = n;
        }
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy derived from `max_retries` and `retry_delay_ms`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms))
    }

    /// Check values that would make every request fail.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.trim().is_empty() {
            return Err("llm.model must not be empty".to_string());
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(format!(
                "llm.endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("llm.temperature must be in [0.0, 2.0]".to_string());
        }
        if self.num_ctx == 0 {
            return Err("llm.num_ctx must be > 0".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("llm.timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}
