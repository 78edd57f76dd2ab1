//! The reqwest-backed [`ContentGenerator`].

use std::time::Duration;

use async_trait::async_trait;
use pipeline::{ContentGenerator, GeneratorError, RetryPolicy, StructuredPrompt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::wire::{self, ChatResponse};
use crate::{LlmConfig, LlmError};

/// First delay of the exponential back-off schedule.
pub const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Longest body excerpt kept in a [`LlmError::Status`].
const ERROR_BODY_CHARS: usize = 512;

/// Calls an OpenAI-compatible chat-completions endpoint.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpContentGenerator {
    http: reqwest::Client,
    config: LlmConfig,
    endpoint: String,
}

impl HttpContentGenerator {
    /// # Errors
    ///
    /// [`LlmError::Configuration`] when `config` is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Configuration {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            endpoint: config.endpoint(),
            http,
            config,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Sends `prompt` to `model`, retrying retryable failures up to `max_retries` times.
    pub async fn complete(&self, model: &str, prompt: &StructuredPrompt) -> Result<Value, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(model, prompt).await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let policy = error.retry_policy();
                    if !policy.is_retryable() || attempt >= self.config.max_retries {
                        return Err(error);
                    }
                    let delay = backoff_delay(attempt, &policy);
                    warn!(
                        model,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retryable LLM failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_once(&self, model: &str, prompt: &StructuredPrompt) -> Result<Value, LlmError> {
        let body = wire::chat_request(&self.config, model, prompt);
        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: text.chars().take(ERROR_BODY_CHARS).collect(),
                retry_after,
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::MalformedResponse {
            message: format!("response body is not a chat completion: {e}"),
        })?;
        wire::answer(prompt.format, parsed)
    }
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn generate(&self, prompt: &StructuredPrompt) -> Result<Value, GeneratorError> {
        let span = info_span!("llm_generate", model = %self.config.model, format = ?prompt.format);
        async {
            let primary = self.complete(&self.config.model, prompt).await;
            let error = match primary {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match self.config.fallback_model.as_deref() {
                Some(fallback) if fallback != self.config.model && error.retry_policy().is_retryable() => {
                    warn!(fallback, error = %error, "primary model exhausted; trying fallback model");
                    self.send_once(fallback, prompt).await.map_err(GeneratorError::from)
                }
                _ => Err(error.into()),
            }
        }
        .instrument(span)
        .await
        .inspect(|_| debug!("generation succeeded"))
    }
}

/// `Retry-After` in whole seconds. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Delay before retry number `attempt + 1`: the server's hint when given,
/// otherwise `BASE_BACKOFF * 2^attempt`.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    match policy {
        RetryPolicy::Retryable { after: Some(after) } => *after,
        _ => BASE_BACKOFF.saturating_mul(2u32.saturating_pow(attempt)),
    }
}
