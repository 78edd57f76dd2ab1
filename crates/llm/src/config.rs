//! Connection and sampling settings for the chat-completions endpoint.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::LlmError;

/// Settings for [`HttpContentGenerator`](crate::HttpContentGenerator).
///
/// Every field has a default, so a partial document deserialises.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Bearer token. Requests are sent unauthenticated when absent.
    pub api_key: Option<String>,
    pub model: String,
    /// Tried once when the primary model is still failing after all retries.
    pub fallback_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request timeout, in seconds.
    pub timeout_secs: u64,
    /// Additional attempts after a retryable failure.
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-4-turbo-preview".to_string(),
            fallback_model: Some("gpt-3.5-turbo".to_string()),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

// Hand-written so the API key never reaches logs.
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `{base_url}/chat/completions`, tolerating a trailing slash on the base.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn validate(&self) -> Result<(), LlmError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("model must not be empty".to_string()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be at least 1".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> LlmError {
    LlmError::Configuration { message }
}
