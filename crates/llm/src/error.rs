//! Errors raised by the HTTP adapter and their retry classification.

use std::time::Duration;

use pipeline::{GeneratorError, RetryPolicy};
use thiserror::Error;

/// A failed chat-completions call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// The adapter is misconfigured; no request was sent.
    #[error("LLM configuration error: {message}")]
    Configuration { message: String },

    /// The request never produced an HTTP response.
    #[error("LLM transport error: {message}")]
    Transport {
        message: String,
        /// Whether the failure was a timeout or a refused connection.
        transient: bool,
    },

    /// The endpoint answered with a non-success status.
    #[error("LLM endpoint returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        /// Parsed from the `Retry-After` header, when present.
        retry_after: Option<Duration>,
    },

    /// The response body was not the expected shape.
    #[error("LLM response was malformed: {message}")]
    MalformedResponse { message: String },
}

impl LlmError {
    /// 429, 5xx, and transient transport failures may be retried; nothing else.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            LlmError::Transport {
                transient: true, ..
            } => RetryPolicy::Retryable { after: None },
            LlmError::Status {
                status,
                retry_after,
                ..
            } if *status == 429 || (500..600).contains(status) => RetryPolicy::Retryable {
                after: *retry_after,
            },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(error: reqwest::Error) -> Self {
        LlmError::Transport {
            transient: error.is_timeout() || error.is_connect(),
            message: error.to_string(),
        }
    }
}

impl From<LlmError> for GeneratorError {
    fn from(error: LlmError) -> Self {
        match error {
            LlmError::Configuration { message } => GeneratorError::Unavailable { message },
            LlmError::MalformedResponse { message } => GeneratorError::MalformedOutput { message },
            other => GeneratorError::RequestFailed {
                retry: other.retry_policy(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16, retry_after: Option<Duration>) -> LlmError {
        LlmError::Status {
            status: code,
            body: String::new(),
            retry_after,
        }
    }

    #[test]
    fn retryable_statuses() {
        let hint = Some(Duration::from_secs(7));
        assert_eq!(
            status(429, hint).retry_policy(),
            RetryPolicy::Retryable { after: hint }
        );
        assert!(status(503, None).retry_policy().is_retryable());
        assert!(!status(400, None).retry_policy().is_retryable());
        assert!(!status(401, None).retry_policy().is_retryable());
    }

    #[test]
    fn transport_failures() {
        let timeout = LlmError::Transport {
            message: "timed out".into(),
            transient: true,
        };
        assert!(timeout.retry_policy().is_retryable());

        let tls = LlmError::Transport {
            message: "bad certificate".into(),
            transient: false,
        };
        assert!(!tls.retry_policy().is_retryable());
    }

    #[test]
    fn conversion_to_generator_error() {
        let converted = GeneratorError::from(status(500, None));
        assert!(matches!(
            converted,
            GeneratorError::RequestFailed {
                retry: RetryPolicy::Retryable { after: None },
                ..
            }
        ));

        let converted = GeneratorError::from(LlmError::MalformedResponse {
            message: "no choices".into(),
        });
        assert!(matches!(converted, GeneratorError::MalformedOutput { .. }));
    }
}
